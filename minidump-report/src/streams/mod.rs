// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! One decoder per known stream type, plus the list readers they share.
//!
//! A decoder sees only its own payload and a [`DecodeContext`] giving access to the rest of
//! the dump for RVA-referenced data. It never fails: whatever it cannot make sense of is
//! pushed to its [`Diagnostics`] and the decoder contributes what it could recover, or
//! nothing at all.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use num_traits::FromPrimitive;
use range_map::{Range, RangeMap};
use scroll::ctx::{SizeWith, TryFromCtx};
use scroll::Endian;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::warn;

use crate::cursor::ByteCursor;
use crate::error::{Diagnostic, DiagnosticKind, StringError};
use crate::header::DirectoryEntry;
use crate::report::PartialListPolicy;
use crate::strings::read_string;
use crate::system_info::{Cpu, Os};

pub mod breakpad;
pub mod crashpad;
pub mod exception;
pub mod linux;
pub mod memory;
pub mod memory_info;
pub mod misc_info;
pub mod module;
pub mod system_info;
pub mod thread;

/// What every decoder may look at besides its own payload.
#[derive(Clone, Copy, Debug)]
pub struct DecodeContext<'a> {
    /// The whole dump, for data referenced by RVA.
    pub dump: ByteCursor<'a>,
    /// From the system info stream, when it decoded.
    pub cpu: Option<Cpu>,
    pub os: Option<Os>,
    pub partial_lists: PartialListPolicy,
}

impl<'a> DecodeContext<'a> {
    pub fn endian(&self) -> Endian {
        self.dump.endian()
    }
}

/// A stream type this crate decodes.
pub trait StreamDecoder<'a>: Sized {
    /// The stream type constant used in the `md::MINIDUMP_DIRECTORY` entry.
    const STREAM_TYPE: u32;

    /// Decode `payload`, the bytes the directory entry points at.
    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<Self>;
}

/// Collects the diagnostics of one directory entry.
#[derive(Debug)]
pub struct Diagnostics {
    stream_type: u32,
    index: usize,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(entry: &DirectoryEntry) -> Diagnostics {
        Diagnostics {
            stream_type: entry.stream_type,
            index: entry.index,
            items: Vec::new(),
        }
    }

    pub fn push<K: Into<DiagnosticKind>>(&mut self, kind: K) {
        let diagnostic = Diagnostic::new(self.stream_type, self.index, kind.into());
        warn!("{}", diagnostic);
        self.items.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

type StringReader = fn(&ByteCursor<'_>, u64) -> Result<String, StringError>;

/// The strings one decoder has read, by RVA.
///
/// Records of a list may all cite the same string. It is decoded once and shared.
pub struct StringTable {
    strings: BTreeMap<u64, Result<Arc<str>, StringError>>,
    reader: StringReader,
}

impl StringTable {
    /// A table of `MINIDUMP_STRING`s.
    pub fn new() -> StringTable {
        StringTable::with_reader(read_string)
    }

    /// A table of strings read by `reader`, e.g. Crashpad's UTF-8 strings.
    pub fn with_reader(reader: StringReader) -> StringTable {
        StringTable {
            strings: BTreeMap::new(),
            reader,
        }
    }

    /// The string at `rva`, or an empty one after recording why it could not be read.
    pub fn read(&mut self, dump: &ByteCursor<'_>, rva: u64, diag: &mut Diagnostics) -> Arc<str> {
        self.try_read(dump, rva).unwrap_or_else(|e| {
            diag.push(e);
            Arc::from("")
        })
    }

    pub fn try_read(&mut self, dump: &ByteCursor<'_>, rva: u64) -> Result<Arc<str>, StringError> {
        self.strings
            .entry(rva)
            .or_insert_with(|| (self.reader)(dump, rva).map(Arc::from))
            .clone()
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a list with a bare u32 count.
///
/// Writers that align entries to 8 bytes put 4 bytes of padding after the count; that
/// layout is recognized when the payload is exactly 4 bytes longer than the count needs.
pub fn read_list<'a, T>(
    payload: &ByteCursor<'a>,
    ctx: &DecodeContext<'a>,
    diag: &mut Diagnostics,
) -> Option<Vec<T>>
where
    T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
    T: SizeWith<Endian>,
{
    let declared = match payload.read_u32(0) {
        Ok(count) => count as u64,
        Err(e) => {
            diag.push(e);
            return None;
        }
    };
    let entry_size = T::size_with(&payload.endian()) as u64;
    let len = payload.len() as u64;
    let start = if len == 8 + declared * entry_size { 8 } else { 4 };
    let entries = read_entries(payload, start, entry_size, entry_size, declared);
    finish_list(entries, declared, ctx, diag)
}

/// Read a list with the extended `size_of_header, size_of_entry, number_of_entries` header.
///
/// Entries may be larger than the layout known here; the trailing fields are skipped.
pub fn read_ex_list<'a, T>(
    payload: &ByteCursor<'a>,
    ctx: &DecodeContext<'a>,
    diag: &mut Diagnostics,
) -> Option<Vec<T>>
where
    T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
    T: SizeWith<Endian>,
{
    let header = (|| {
        Ok::<_, crate::error::ReadError>((
            payload.read_u32(0)?,
            payload.read_u32(4)?,
            payload.read_u32(8)?,
        ))
    })();
    let (size_of_header, size_of_entry, number_of_entries) = match header {
        Ok(header) => header,
        Err(e) => {
            diag.push(e);
            return None;
        }
    };
    let expected_size_of_entry = T::size_with(&payload.endian()) as u32;
    if size_of_header < 12 || size_of_entry < expected_size_of_entry {
        diag.push(DiagnosticKind::InvalidField {
            detail: format!(
                "list header declares {size_of_header} byte header and {size_of_entry} byte entries, \
                 need at least 12 and {expected_size_of_entry}"
            ),
        });
        return None;
    }
    let declared = number_of_entries as u64;
    let entries = read_entries(
        payload,
        size_of_header as u64,
        size_of_entry as u64,
        expected_size_of_entry as u64,
        declared,
    );
    finish_list(entries, declared, ctx, diag)
}

/// Read up to `declared` entries spaced `stride` bytes apart, stopping at the first one
/// that does not fit.
fn read_entries<'a, T>(
    payload: &ByteCursor<'a>,
    start: u64,
    stride: u64,
    entry_size: u64,
    declared: u64,
) -> Vec<T>
where
    T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
    T: SizeWith<Endian>,
{
    let room = (payload.len() as u64).saturating_sub(start);
    // The last entry only needs `entry_size` bytes, not a whole stride.
    let fits = if room < entry_size {
        0
    } else {
        (room - entry_size) / stride + 1
    };
    let count = declared.min(fits);
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        match payload.read_fixed_struct(start + i * stride) {
            Ok(entry) => entries.push(entry),
            Err(_) => break,
        }
    }
    entries
}

fn finish_list<T>(
    entries: Vec<T>,
    declared: u64,
    ctx: &DecodeContext<'_>,
    diag: &mut Diagnostics,
) -> Option<Vec<T>> {
    let recovered = entries.len() as u64;
    if recovered < declared {
        diag.push(DiagnosticKind::PartialStream {
            recovered,
            declared,
        });
        if ctx.partial_lists == PartialListPolicy::Discard {
            return None;
        }
    }
    Some(entries)
}

/// Build an address lookup from inclusive `(start, end)` ranges.
///
/// Ranges that overlap another one with a different value are left out of the lookup.
pub fn range_map<V>(ranges: impl IntoIterator<Item = (Option<(u64, u64)>, V)>) -> RangeMap<u64, V>
where
    V: Clone + Eq + Debug,
{
    let ranges = ranges
        .into_iter()
        .filter_map(|(range, val)| range.map(|(start, end)| (Range::new(start, end), val)));
    RangeMap::try_from_iter(ranges).unwrap_or_else(|e| {
        for (range, val) in &e.discarded {
            warn!(
                "ignoring overlapping range {:#x}-{:#x} ({:?})",
                range.start, range.end, val
            );
        }
        e.non_overlapping
    })
}

/// Where a stream type was defined.
pub fn stream_vendor(stream_type: u32) -> &'static str {
    if stream_type <= MINIDUMP_STREAM_TYPE::LastReservedStream as u32 {
        "Official"
    } else {
        match stream_type & 0xFFFF0000 {
            0x4767_0000 => "Google Extension",
            0x4d7a_0000 => "Mozilla Extension",
            _ => "Unknown Extension",
        }
    }
}

/// The name of a known stream type, or its value in hex.
pub fn stream_name(stream_type: u32) -> String {
    match MINIDUMP_STREAM_TYPE::from_u32(stream_type) {
        Some(known) => format!("{known:?}"),
        None => format!("{stream_type:#x}"),
    }
}

/// Resolve a location descriptor that may legitimately be empty.
///
/// An all-zero descriptor means "absent" and is not an error.
pub fn optional_location<'a>(
    dump: &ByteCursor<'a>,
    loc: &md::MINIDUMP_LOCATION_DESCRIPTOR,
) -> Option<Result<&'a [u8], crate::error::ReadError>> {
    if loc.data_size == 0 {
        None
    } else {
        Some(dump.location(loc))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::LE;

    fn context(dump: &[u8], partial_lists: PartialListPolicy) -> DecodeContext<'_> {
        DecodeContext {
            dump: ByteCursor::new(dump, LE),
            cpu: None,
            os: None,
            partial_lists,
        }
    }

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(&DirectoryEntry {
            index: 3,
            stream_type: 5,
            location: Default::default(),
        })
    }

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_read_list() {
        let payload = words(&[2, 0x10, 0x20, 0x30, 0x40]);
        let ctx = context(&payload, PartialListPolicy::Keep);
        let mut diag = diagnostics();
        let list: Vec<md::MINIDUMP_LOCATION_DESCRIPTOR> =
            read_list(&ctx.dump, &ctx, &mut diag).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].rva, 0x40);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_read_list_with_padding() {
        let payload = words(&[1, 0xffff, 0x10, 0x20]);
        let ctx = context(&payload, PartialListPolicy::Keep);
        let mut diag = diagnostics();
        let list: Vec<md::MINIDUMP_LOCATION_DESCRIPTOR> =
            read_list(&ctx.dump, &ctx, &mut diag).unwrap();
        assert_eq!(
            list,
            vec![md::MINIDUMP_LOCATION_DESCRIPTOR {
                data_size: 0x10,
                rva: 0x20
            }]
        );
    }

    #[test]
    fn test_read_list_partial() {
        let payload = words(&[1000, 0x10, 0x20, 0x30]);
        for policy in [PartialListPolicy::Keep, PartialListPolicy::Discard] {
            let ctx = context(&payload, policy);
            let mut diag = diagnostics();
            let list: Option<Vec<md::MINIDUMP_LOCATION_DESCRIPTOR>> =
                read_list(&ctx.dump, &ctx, &mut diag);
            match policy {
                PartialListPolicy::Keep => assert_eq!(list.unwrap().len(), 1),
                PartialListPolicy::Discard => assert!(list.is_none()),
            }
            let diags = diag.into_vec();
            assert_eq!(
                diags,
                vec![Diagnostic::new(
                    5,
                    3,
                    DiagnosticKind::PartialStream {
                        recovered: 1,
                        declared: 1000
                    }
                )]
            );
        }
    }

    #[test]
    fn test_read_list_no_count() {
        let payload = [1u8, 0];
        let ctx = context(&payload, PartialListPolicy::Keep);
        let mut diag = diagnostics();
        let list: Option<Vec<md::MINIDUMP_LOCATION_DESCRIPTOR>> =
            read_list(&ctx.dump, &ctx, &mut diag);
        assert!(list.is_none());
        assert_eq!(diag.into_vec()[0].kind.name(), "TruncatedStream");
    }

    #[test]
    fn test_read_ex_list_larger_entries() {
        // 16 byte header, 12 byte entries of which 8 are known.
        let payload = words(&[16, 12, 2, 0, 1, 2, 0xaa, 3, 4, 0xbb]);
        let ctx = context(&payload, PartialListPolicy::Keep);
        let mut diag = diagnostics();
        let list: Vec<md::MINIDUMP_LOCATION_DESCRIPTOR> =
            read_ex_list(&ctx.dump, &ctx, &mut diag).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!((list[1].data_size, list[1].rva), (3, 4));
        assert!(diag.is_empty());
    }

    #[test]
    fn test_read_ex_list_small_entries() {
        let payload = words(&[12, 4, 1, 0]);
        let ctx = context(&payload, PartialListPolicy::Keep);
        let mut diag = diagnostics();
        let list: Option<Vec<md::MINIDUMP_LOCATION_DESCRIPTOR>> =
            read_ex_list(&ctx.dump, &ctx, &mut diag);
        assert!(list.is_none());
        assert_eq!(diag.into_vec()[0].kind.name(), "InvalidField");
    }

    #[test]
    fn test_range_map_skips_overlaps() {
        let map = range_map(vec![
            (Some((0x1000, 0x1fff)), 0usize),
            (Some((0x1800, 0x27ff)), 1),
            (None, 2),
            (Some((0x3000, 0x3fff)), 3),
        ]);
        assert_eq!(map.get(0x1900), Some(&0));
        assert_eq!(map.get(0x2000), None);
        assert_eq!(map.get(0x3000), Some(&3));
    }

    #[test]
    fn test_stream_names() {
        assert_eq!(stream_vendor(4), "Official");
        assert_eq!(stream_vendor(0x47670003), "Google Extension");
        assert_eq!(stream_vendor(0x4d7a0001), "Mozilla Extension");
        assert_eq!(stream_vendor(0x12345678), "Unknown Extension");
        assert_eq!(stream_name(3), "ThreadListStream");
        assert_eq!(stream_name(0xdeadbeef), "0xdeadbeef");
    }
}
