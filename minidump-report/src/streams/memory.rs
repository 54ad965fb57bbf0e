// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Captured memory: `MemoryListStream` and `Memory64ListStream`.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use range_map::RangeMap;
use scroll::ctx::{SizeWith, TryFromCtx};
use scroll::{Endian, Pread};
use std::io;
use std::io::prelude::*;

use crate::cursor::ByteCursor;
use crate::error::{DiagnosticKind, ReadError};
use crate::streams::{
    finish_list, range_map, read_entries, read_list, DecodeContext, Diagnostics, StreamDecoder,
};

/// A region of memory from the crashed process.
///
/// The bytes are a view into the dump buffer, never a copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion<'a> {
    /// The starting address of this range of memory.
    pub base_address: u64,
    /// The length of this range of memory.
    pub size: u64,
    /// Offset of the contents in the dump.
    pub rva: u64,
    /// The contents of the memory.
    pub bytes: &'a [u8],
}

impl<'a> MemoryRegion<'a> {
    /// Resolve a `MINIDUMP_MEMORY_DESCRIPTOR` against the dump.
    pub fn read(
        desc: &md::MINIDUMP_MEMORY_DESCRIPTOR,
        dump: &ByteCursor<'a>,
    ) -> Result<MemoryRegion<'a>, ReadError> {
        let bytes = dump.location(&desc.memory)?;
        Ok(MemoryRegion {
            base_address: desc.start_of_memory_range,
            size: desc.memory.data_size as u64,
            rva: desc.memory.rva as u64,
            bytes,
        })
    }

    /// Get `T` from the memory at `addr`, read in the dump's byte order.
    ///
    /// Return `None` if the requested address range falls out of the bounds
    /// of this memory region.
    pub fn get_memory_at_address<T>(&self, addr: u64, endian: Endian) -> Option<T>
    where
        T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
        T: SizeWith<Endian>,
    {
        let start = usize::try_from(addr.checked_sub(self.base_address)?).ok()?;
        self.bytes.pread_with::<T>(start, endian).ok()
    }

    /// The inclusive address range, `None` for an empty region or one that wraps.
    pub fn memory_range(&self) -> Option<(u64, u64)> {
        if self.size == 0 {
            return None;
        }
        Some((self.base_address, self.base_address.checked_add(self.size)? - 1))
    }

    /// Write a human-readable description of this `MemoryRegion` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_MEMORY_DESCRIPTOR
  start_of_memory_range = {:#x}
  memory.data_size      = {:#x}
  memory.rva            = {:#x}
Memory
",
            self.base_address, self.size, self.rva,
        )?;
        self.print_contents(f)?;
        writeln!(f)
    }

    /// Write the contents of this `MemoryRegion` to `f` as a hex dump.
    pub fn print_contents<T: Write>(&self, f: &mut T) -> io::Result<()> {
        const PARAGRAPH_SIZE: usize = 16;
        for (i, paragraph) in self.bytes.chunks(PARAGRAPH_SIZE).enumerate() {
            write!(f, "    {:08x}: ", i * PARAGRAPH_SIZE)?;
            let mut byte_iter = paragraph.iter().fuse();
            for _ in 0..PARAGRAPH_SIZE {
                if let Some(byte) = byte_iter.next() {
                    write!(f, "{byte:02x} ")?;
                } else {
                    write!(f, "   ")?;
                }
            }
            for &byte in paragraph {
                let ascii_char = if !byte.is_ascii() || byte.is_ascii_control() {
                    '.'
                } else {
                    char::from(byte)
                };
                write!(f, "{ascii_char}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Memory regions in dump order, with an address lookup.
#[derive(Clone, Debug)]
pub struct MemoryList<'a> {
    regions: Vec<MemoryRegion<'a>>,
    regions_by_addr: RangeMap<u64, usize>,
}

impl PartialEq for MemoryList<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.regions == other.regions
    }
}

impl Eq for MemoryList<'_> {}

impl<'a> MemoryList<'a> {
    /// Return an empty `MemoryList`.
    pub fn new() -> MemoryList<'a> {
        MemoryList {
            regions: vec![],
            regions_by_addr: RangeMap::new(),
        }
    }

    /// Create a `MemoryList` from a list of `MemoryRegion`s.
    ///
    /// A region overlapping an earlier one stays in the list but is not found by address.
    pub fn from_regions(regions: Vec<MemoryRegion<'a>>) -> MemoryList<'a> {
        let regions_by_addr = range_map(
            regions
                .iter()
                .enumerate()
                .map(|(i, region)| (region.memory_range(), i)),
        );
        MemoryList {
            regions,
            regions_by_addr,
        }
    }

    /// Append `other`'s regions after this list's.
    pub fn merge(self, other: MemoryList<'a>) -> MemoryList<'a> {
        let mut regions = self.regions;
        regions.extend(other.regions);
        MemoryList::from_regions(regions)
    }

    /// Return a `MemoryRegion` containing memory at `address`, if one exists.
    pub fn memory_at_address(&self, address: u64) -> Option<&MemoryRegion<'a>> {
        self.regions_by_addr
            .get(address)
            .map(|&index| &self.regions[index])
    }

    /// Iterate over the memory regions in the order contained in the minidump.
    pub fn iter<'slf>(&'slf self) -> impl Iterator<Item = &'slf MemoryRegion<'a>> {
        self.regions.iter()
    }

    /// Iterate over the memory regions in order by memory address.
    pub fn by_addr<'slf>(&'slf self) -> impl Iterator<Item = &'slf MemoryRegion<'a>> {
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

    /// Write a human-readable description of this `MemoryList` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MinidumpMemoryList
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

impl Default for MemoryList<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> StreamDecoder<'a> for MemoryList<'a> {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::MemoryListStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<MemoryList<'a>> {
        let descriptors: Vec<md::MINIDUMP_MEMORY_DESCRIPTOR> = read_list(&payload, ctx, diag)?;
        let mut regions = Vec::with_capacity(descriptors.len());
        for desc in &descriptors {
            match MemoryRegion::read(desc, &ctx.dump) {
                Ok(region) => regions.push(region),
                Err(e) => diag.push(DiagnosticKind::TruncatedStream {
                    detail: format!(
                        "memory region at {:#x}: {e}",
                        desc.start_of_memory_range
                    ),
                }),
            }
        }
        Some(MemoryList::from_regions(regions))
    }
}

/// The regions of a `Memory64ListStream`.
///
/// Full-memory dumps store every region back to back starting at one base offset, so a
/// region that does not fit ends the list: the offsets of all later regions depend on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memory64List<'a> {
    pub regions: Vec<MemoryRegion<'a>>,
}

impl<'a> StreamDecoder<'a> for Memory64List<'a> {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::Memory64ListStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<Memory64List<'a>> {
        let header: md::MINIDUMP_MEMORY64_LIST = match payload.read_fixed_struct(0) {
            Ok(header) => header,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        let header_size = md::MINIDUMP_MEMORY64_LIST::size_with(&ctx.endian()) as u64;
        let entry_size = md::MINIDUMP_MEMORY_DESCRIPTOR64::size_with(&ctx.endian()) as u64;
        let descriptors: Vec<md::MINIDUMP_MEMORY_DESCRIPTOR64> = read_entries(
            &payload,
            header_size,
            entry_size,
            entry_size,
            header.number_of_memory_ranges,
        );
        let descriptors = finish_list(descriptors, header.number_of_memory_ranges, ctx, diag)?;

        let mut regions = Vec::with_capacity(descriptors.len());
        let mut rva = header.base_rva;
        for desc in &descriptors {
            let bytes = match ctx.dump.read_bytes(rva, desc.data_size) {
                Ok(bytes) => bytes,
                Err(e) => {
                    diag.push(DiagnosticKind::TruncatedStream {
                        detail: format!(
                            "memory region at {:#x}: {e}",
                            desc.start_of_memory_range
                        ),
                    });
                    break;
                }
            };
            regions.push(MemoryRegion {
                base_address: desc.start_of_memory_range,
                size: desc.data_size,
                rva,
                bytes,
            });
            // In bounds, so this cannot overflow.
            rva += desc.data_size;
        }
        Some(Memory64List { regions })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse;
    use minidump_synth::{Memory, SimpleStream, SynthMinidump};
    use scroll::LE;
    use test_assembler::{Endian as SynthEndian, Section};

    #[test]
    fn test_memory_list() {
        const CONTENTS: &[u8] = b"memory_contents";
        let memory = Memory::with_section(Section::new().append_bytes(CONTENTS), 0x309d68010bd21b2c);
        let dump = SynthMinidump::new().add_memory(memory).finish().unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());
        let memory = report.memory.unwrap();
        assert_eq!(memory.len(), 1);
        let region = memory.iter().next().unwrap();
        assert_eq!(region.base_address, 0x309d68010bd21b2c);
        assert_eq!(region.size, CONTENTS.len() as u64);
        assert_eq!(region.bytes, CONTENTS);
        assert_eq!(
            &dump[region.rva as usize..region.rva as usize + CONTENTS.len()],
            CONTENTS
        );
        assert_eq!(
            memory
                .memory_at_address(0x309d68010bd21b2c + 3)
                .unwrap()
                .get_memory_at_address::<u8>(0x309d68010bd21b2c + 3, LE),
            Some(b'o')
        );
        assert!(memory.memory_at_address(0x309d68010bd21b2c + 15).is_none());
    }

    #[test]
    fn test_memory64_list_merged_after_memory_list() {
        let dump = SynthMinidump::new()
            .add_memory(Memory::with_section(Section::new().append_bytes(b"abcd"), 0x1000))
            .add_memory64(Memory::with_section(Section::new().append_bytes(b"efgh"), 0x2000))
            .add_memory64(Memory::with_section(Section::new().append_bytes(b"ij"), 0x3000))
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());
        let memory = report.memory.unwrap();
        let bases: Vec<u64> = memory.iter().map(|r| r.base_address).collect();
        assert_eq!(bases, vec![0x1000, 0x2000, 0x3000]);
        assert_eq!(memory.memory_at_address(0x2003).unwrap().bytes, b"efgh");
        assert_eq!(memory.memory_at_address(0x3001).unwrap().bytes, b"ij");
    }

    #[test]
    fn test_memory_region_out_of_bounds() {
        // One descriptor whose contents lie far past the end of the dump.
        let list = SimpleStream {
            stream_type: MemoryList::STREAM_TYPE,
            section: Section::new()
                .D32(1)
                .D64(0x1000)
                .D32(0x100)
                .D32(0x7fff_0000),
        };
        let dump = SynthMinidump::new().add_stream(list).finish().unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.memory.unwrap().is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind.name(), "TruncatedStream");
        assert_eq!(report.diagnostics[0].stream_type, MemoryList::STREAM_TYPE);
    }

    #[test]
    fn test_memory64_stops_at_first_missing_region() {
        let list = SimpleStream {
            stream_type: Memory64List::STREAM_TYPE,
            section: Section::new()
                .D64(2)
                .D64(0) // base_rva: the header, which is in bounds
                .D64(0x1000)
                .D64(0x10)
                .D64(0x2000)
                .D64(0xffff_ffff),
        };
        let dump = SynthMinidump::new().add_stream(list).finish().unwrap();
        let report = parse(&dump).unwrap();
        let memory = report.memory.unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.iter().next().unwrap().rva, 0);
        assert_eq!(report.diagnostics[0].kind.name(), "TruncatedStream");
    }

    #[test]
    fn test_print_contents() {
        let region = MemoryRegion {
            base_address: 0x1000,
            size: 4,
            rva: 0,
            bytes: b"ab\x00\xff",
        };
        let mut out = Vec::new();
        region.print_contents(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("    00000000: 61 62 00 ff {}ab..\n", "   ".repeat(12))
        );
    }

    #[test]
    fn test_big_endian_memory() {
        let memory = Memory::with_section(
            Section::with_endian(SynthEndian::Big).D32(0x01020304),
            0x5000,
        );
        let dump = SynthMinidump::with_endian(SynthEndian::Big)
            .add_memory(memory)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let memory = report.memory.unwrap();
        let region = memory.memory_at_address(0x5000).unwrap();
        assert_eq!(
            region.get_memory_at_address::<u32>(0x5000, report.endian),
            Some(0x01020304)
        );
    }
}
