// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The header and stream directory: the only parts whose damage is fatal.

use minidump_format::format as md;
use scroll::ctx::SizeWith;
use scroll::{Endian, BE, LE};
use std::io;
use std::io::prelude::*;
use tracing::trace;

use crate::cursor::ByteCursor;
use crate::error::FatalError;
use crate::strings::format_time_t;

/// One entry of the stream directory, with its position in the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub index: usize,
    pub stream_type: u32,
    pub location: md::MINIDUMP_LOCATION_DESCRIPTOR,
}

/// Validate the header at offset 0 and work out the byte order of the dump.
pub fn read_header(bytes: &[u8]) -> Result<(md::MINIDUMP_HEADER, Endian), FatalError> {
    let truncated = FatalError::TruncatedHeader { len: bytes.len() };
    if bytes.len() < md::MINIDUMP_HEADER::size_with(&LE) {
        return Err(truncated);
    }
    let signature = ByteCursor::new(bytes, LE)
        .read_u32(0)
        .map_err(|_| truncated.clone())?;
    let endian = if signature == md::MINIDUMP_SIGNATURE {
        LE
    } else if signature.swap_bytes() == md::MINIDUMP_SIGNATURE {
        BE
    } else {
        return Err(FatalError::InvalidMagic { signature });
    };
    let header: md::MINIDUMP_HEADER = ByteCursor::new(bytes, endian)
        .read_fixed_struct(0)
        .map_err(|_| truncated)?;
    if (header.version & 0x0000ffff) != md::MINIDUMP_VERSION {
        return Err(FatalError::UnsupportedVersion {
            version: header.version,
        });
    }
    Ok((header, endian))
}

/// Read every directory entry; the whole array must lie inside the buffer.
pub fn read_directory(
    dump: &ByteCursor<'_>,
    header: &md::MINIDUMP_HEADER,
) -> Result<Vec<DirectoryEntry>, FatalError> {
    let out_of_bounds = || FatalError::DirectoryOutOfBounds {
        rva: header.stream_directory_rva,
        count: header.stream_count,
        buffer_len: dump.len(),
    };
    let entry_size = md::MINIDUMP_DIRECTORY::size_with(&dump.endian()) as u64;
    let start = header.stream_directory_rva as u64;
    // Both factors are at most 32 bits wide, so neither of these can overflow a u64.
    let size = header.stream_count as u64 * entry_size;
    dump.read_bytes(start, size).map_err(|_| out_of_bounds())?;

    let mut entries = Vec::with_capacity(header.stream_count as usize);
    for index in 0..header.stream_count as usize {
        let raw: md::MINIDUMP_DIRECTORY = dump
            .read_fixed_struct(start + index as u64 * entry_size)
            .map_err(|_| out_of_bounds())?;
        trace!(
            "directory entry {}: type {:#x} at {:#x}+{:#x}",
            index,
            raw.stream_type,
            raw.location.rva,
            raw.location.data_size
        );
        entries.push(DirectoryEntry {
            index,
            stream_type: raw.stream_type,
            location: raw.location,
        });
    }
    Ok(entries)
}

/// Write a human-readable description of the header to `f`.
///
/// This is very verbose, it is the format used by `minidump_dump`.
pub fn print_header<T: Write>(f: &mut T, header: &md::MINIDUMP_HEADER) -> io::Result<()> {
    write!(
        f,
        r#"MDRawHeader
  signature            = {:#x}
  version              = {:#x}
  stream_count         = {}
  stream_directory_rva = {:#x}
  checksum             = {:#x}
  time_date_stamp      = {:#x} {}
  flags                = {:#x}

"#,
        header.signature,
        header.version,
        header.stream_count,
        header.stream_directory_rva,
        header.checksum,
        header.time_date_stamp,
        format_time_t(header.time_date_stamp),
        header.flags,
    )
}

pub fn print_directory<T: Write>(f: &mut T, entries: &[DirectoryEntry]) -> io::Result<()> {
    for entry in entries {
        write!(
            f,
            r#"mDirectory[{}]
MDRawDirectory
  stream_type        = {:#x} ({})
  location.data_size = {}
  location.rva       = {:#x}

"#,
            entry.index,
            entry.stream_type,
            crate::streams::stream_name(entry.stream_type),
            entry.location.data_size,
            entry.location.rva,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use minidump_synth::SynthMinidump;
    use test_assembler::Endian as SynthEndian;

    #[test]
    fn test_empty_buffer() {
        assert_eq!(
            read_header(&[]),
            Err(FatalError::TruncatedHeader { len: 0 })
        );
        assert_eq!(
            read_header(b"MDMP"),
            Err(FatalError::TruncatedHeader { len: 4 })
        );
    }

    #[test]
    fn test_little_and_big_endian() {
        let dump = SynthMinidump::with_endian(SynthEndian::Little)
            .finish()
            .unwrap();
        let (header, endian) = read_header(&dump).unwrap();
        assert_eq!(endian, LE);
        assert_eq!(header.stream_count, 0);
        assert_eq!(header.time_date_stamp, 1262805309);

        let dump = SynthMinidump::with_endian(SynthEndian::Big)
            .finish()
            .unwrap();
        let (header, endian) = read_header(&dump).unwrap();
        assert_eq!(endian, BE);
        assert_eq!(header.signature, md::MINIDUMP_SIGNATURE);
        assert_eq!(header.version, md::MINIDUMP_VERSION);
    }

    #[test]
    fn test_bad_signature() {
        let mut dump = SynthMinidump::new().finish().unwrap();
        dump[0] = b'X';
        assert!(matches!(
            read_header(&dump),
            Err(FatalError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_version_high_bits_ignored() {
        let dump = SynthMinidump::new()
            .version(0xabcd_0000 | md::MINIDUMP_VERSION)
            .finish()
            .unwrap();
        assert!(read_header(&dump).is_ok());

        let dump = SynthMinidump::new().version(1).finish().unwrap();
        assert_eq!(
            read_header(&dump),
            Err(FatalError::UnsupportedVersion { version: 1 })
        );
    }

    #[test]
    fn test_directory_out_of_bounds() {
        let dump = SynthMinidump::new()
            .add_raw_directory_entry(0x1234, 4, 0)
            .finish()
            .unwrap();
        let (header, endian) = read_header(&dump).unwrap();
        let cursor = ByteCursor::new(&dump, endian);
        let entries = read_directory(&cursor, &header).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stream_type, 0x1234);

        // Cut the last byte of the directory off.
        let short = &dump[..dump.len() - 1];
        let cursor = ByteCursor::new(short, endian);
        assert!(matches!(
            read_directory(&cursor, &header),
            Err(FatalError::DirectoryOutOfBounds { count: 1, .. })
        ));
    }
}
