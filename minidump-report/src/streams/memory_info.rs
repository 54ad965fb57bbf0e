// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use range_map::RangeMap;
use std::io;
use std::io::prelude::*;

use crate::cursor::ByteCursor;
use crate::streams::{range_map, read_ex_list, DecodeContext, Diagnostics, StreamDecoder};

/// Metadata about a region of memory (whether it is executable, freed, private, and so on).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryInfo {
    /// The raw value from the minidump.
    pub raw: md::MINIDUMP_MEMORY_INFO,
    /// The memory protection when the region was initially allocated.
    pub allocation_protection: md::MemoryProtection,
    /// The state of the pages in the region (whether it is freed or not).
    pub state: md::MemoryState,
    /// The access protection of the pages in the region.
    pub protection: md::MemoryProtection,
    /// What kind of memory mapping the pages in this region are.
    pub ty: md::MemoryType,
}

impl MemoryInfo {
    pub fn new(raw: md::MINIDUMP_MEMORY_INFO) -> MemoryInfo {
        MemoryInfo {
            allocation_protection: md::MemoryProtection::from_bits_truncate(
                raw.allocation_protection,
            ),
            state: md::MemoryState::from_bits_truncate(raw.state),
            protection: md::MemoryProtection::from_bits_truncate(raw.protection),
            ty: md::MemoryType::from_bits_truncate(raw._type),
            raw,
        }
    }

    pub fn base_address(&self) -> u64 {
        self.raw.base_address
    }

    pub fn size(&self) -> u64 {
        self.raw.region_size
    }

    /// Inclusive address range, `None` for empty or wrapping regions.
    pub fn memory_range(&self) -> Option<(u64, u64)> {
        if self.raw.region_size == 0 {
            return None;
        }
        Some((
            self.raw.base_address,
            self.raw.base_address.checked_add(self.raw.region_size)? - 1,
        ))
    }

    /// Whether this memory range was executable.
    pub fn is_executable(&self) -> bool {
        self.protection.intersects(
            md::MemoryProtection::PAGE_EXECUTE
                | md::MemoryProtection::PAGE_EXECUTE_READ
                | md::MemoryProtection::PAGE_EXECUTE_READWRITE
                | md::MemoryProtection::PAGE_EXECUTE_WRITECOPY,
        )
    }

    /// Write a human-readable description.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_MEMORY_INFO
  base_address          = {:#x}
  allocation_base       = {:#x}
  allocation_protection = {:#x}
  region_size           = {:#x}
  state                 = {:#x}
  protection            = {:#x}
  _type                 = {:#x}
",
            self.raw.base_address,
            self.raw.allocation_base,
            self.allocation_protection.bits(),
            self.raw.region_size,
            self.state.bits(),
            self.protection.bits(),
            self.ty.bits(),
        )?;
        writeln!(f)
    }
}

/// The region metadata from a `MemoryInfoListStream`.
#[derive(Clone, Debug)]
pub struct MemoryInfoList {
    /// The memory regions, in the order they were stored in the minidump.
    regions: Vec<MemoryInfo>,
    /// Map from address range to index in regions.
    regions_by_addr: RangeMap<u64, usize>,
}

impl PartialEq for MemoryInfoList {
    fn eq(&self, other: &Self) -> bool {
        self.regions == other.regions
    }
}

impl Eq for MemoryInfoList {}

impl Default for MemoryInfoList {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInfoList {
    pub fn new() -> MemoryInfoList {
        MemoryInfoList {
            regions: vec![],
            regions_by_addr: RangeMap::new(),
        }
    }

    pub fn from_regions(regions: Vec<MemoryInfo>) -> MemoryInfoList {
        let regions_by_addr = range_map(
            regions
                .iter()
                .enumerate()
                .map(|(i, region)| (region.memory_range(), i)),
        );
        MemoryInfoList {
            regions,
            regions_by_addr,
        }
    }

    /// Return the region containing `address`, if one exists.
    pub fn memory_info_at_address(&self, address: u64) -> Option<&MemoryInfo> {
        self.regions_by_addr
            .get(address)
            .map(|&index| &self.regions[index])
    }

    /// Iterate over the regions in the order contained in the minidump.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryInfo> {
        self.regions.iter()
    }

    /// Iterate over the regions in order by memory address.
    pub fn by_addr(&self) -> impl Iterator<Item = &MemoryInfo> {
        self.regions_by_addr
            .ranges_values()
            .map(move |&(_, index)| &self.regions[index])
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Write a human-readable description.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MinidumpMemoryInfoList
  region_count = {}

",
            self.regions.len()
        )?;
        for (i, region) in self.regions.iter().enumerate() {
            writeln!(f, "region[{i}]")?;
            region.print(f)?;
        }
        Ok(())
    }
}

impl<'a> StreamDecoder<'a> for MemoryInfoList {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::MemoryInfoListStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<MemoryInfoList> {
        let raw: Vec<md::MINIDUMP_MEMORY_INFO> = read_ex_list(&payload, ctx, diag)?;
        Some(MemoryInfoList::from_regions(
            raw.into_iter().map(MemoryInfo::new).collect(),
        ))
    }
}
