// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Text fields: `MINIDUMP_STRING`s, fixed UTF-16 arrays and NUL-terminated byte strings.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use scroll::Endian;
use std::borrow::Cow;
use time::format_description::well_known::Rfc3339;

use crate::cursor::ByteCursor;
use crate::error::StringError;

/// Read the u32 length-prefixed UTF-16 string at `offset` in the dump.
///
/// The length is in bytes and does not include a terminator.
pub fn read_string(dump: &ByteCursor<'_>, offset: u64) -> Result<String, StringError> {
    let truncated = StringError::TruncatedString { offset };
    let size = dump.read_u32(offset).map_err(|_| truncated.clone())?;
    let bytes = dump
        .read_bytes(offset + 4, size as u64)
        .map_err(|_| truncated)?;
    if size % 2 != 0 {
        return Err(StringError::MalformedString {
            offset,
            detail: "odd byte length",
        });
    }
    let encoding: &'static Encoding = match dump.endian() {
        Endian::Little => UTF_16LE,
        Endian::Big => UTF_16BE,
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or(StringError::MalformedString {
            offset,
            detail: "invalid UTF-16",
        })
}

/// Read the u32 length-prefixed, NUL-terminated UTF-8 string at `offset` in the dump.
pub fn read_utf8_string(dump: &ByteCursor<'_>, offset: u64) -> Result<String, StringError> {
    read_utf8(dump, offset, true)
}

/// Like [`read_utf8_string`] but with no terminator after the bytes.
pub fn read_utf8_unterminated(dump: &ByteCursor<'_>, offset: u64) -> Result<String, StringError> {
    read_utf8(dump, offset, false)
}

fn read_utf8(dump: &ByteCursor<'_>, offset: u64, terminated: bool) -> Result<String, StringError> {
    let truncated = StringError::TruncatedString { offset };
    let size = dump.read_u32(offset).map_err(|_| truncated.clone())? as u64;
    let bytes = dump.read_bytes(offset + 4, size).map_err(|_| truncated.clone())?;
    if terminated {
        match dump.read_bytes(offset + 4 + size, 1) {
            Ok([0]) => {}
            Ok(_) => {
                return Err(StringError::MalformedString {
                    offset,
                    detail: "missing NUL terminator",
                })
            }
            Err(_) => return Err(truncated),
        }
    }
    std::str::from_utf8(bytes)
        .map(String::from)
        .map_err(|_| StringError::MalformedString {
            offset,
            detail: "invalid UTF-8",
        })
}

/// Decode a NUL-padded UTF-16 array that was already read in the dump's byte order.
pub fn utf16_to_string(data: &[u16]) -> Option<String> {
    let len = data.iter().take_while(|c| **c != 0).count();
    String::from_utf16(&data[..len]).ok()
}

/// Convert `bytes` with trailing NUL characters to a string
pub fn string_from_bytes_nul(bytes: &[u8]) -> Option<Cow<'_, str>> {
    bytes.split(|&b| b == 0).next().map(String::from_utf8_lossy)
}

/// Format `bytes` as a String of hex digits
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let hex_bytes: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    hex_bytes.join("")
}

/// RFC 3339 rendering of a `time_t`, empty if it cannot be represented.
pub fn format_time_t(t: u32) -> String {
    time::OffsetDateTime::from_unix_timestamp(t as i64)
        .ok()
        .and_then(|datetime| datetime.format(&Rfc3339).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::{BE, LE};

    fn utf16le(s: &str) -> Vec<u8> {
        let mut bytes = vec![];
        let units: Vec<u16> = s.encode_utf16().collect();
        bytes.extend_from_slice(&((units.len() * 2) as u32).to_le_bytes());
        for unit in units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_read_string() {
        let mut data = vec![0xff, 0xff];
        data.extend(utf16le("c:\\test_app.exe"));
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(read_string(&dump, 2).unwrap(), "c:\\test_app.exe");
    }

    #[test]
    fn test_read_string_big_endian() {
        let data = [0, 0, 0, 4, 0, b'h', 0, b'i'];
        let dump = ByteCursor::new(&data, BE);
        assert_eq!(read_string(&dump, 0).unwrap(), "hi");
    }

    #[test]
    fn test_read_empty_string() {
        let data = [0u8; 4];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(read_string(&dump, 0).unwrap(), "");
    }

    #[test]
    fn test_truncated_string() {
        let data = [0x10, 0, 0, 0, b'a', 0];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(
            read_string(&dump, 0),
            Err(StringError::TruncatedString { offset: 0 })
        );
        // Not even room for the length.
        assert_eq!(
            read_string(&dump, 4),
            Err(StringError::TruncatedString { offset: 4 })
        );
        assert!(read_string(&dump, u64::MAX - 1).is_err());
    }

    #[test]
    fn test_malformed_string() {
        let data = [3, 0, 0, 0, b'a', 0, b'b'];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(
            read_string(&dump, 0),
            Err(StringError::MalformedString {
                offset: 0,
                detail: "odd byte length"
            })
        );

        // An unpaired high surrogate.
        let data = [2, 0, 0, 0, 0x00, 0xd8];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(
            read_string(&dump, 0),
            Err(StringError::MalformedString {
                offset: 0,
                detail: "invalid UTF-16"
            })
        );
    }

    #[test]
    fn test_read_utf8_string() {
        let data = [0xff, 3, 0, 0, 0, b'k', b'e', b'y', 0, 2, 0, 0, 0, 0xc3, 0xa9];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(read_utf8_string(&dump, 1).unwrap(), "key");
        assert_eq!(read_utf8_unterminated(&dump, 9).unwrap(), "\u{e9}");
        // The terminator would be past the end.
        assert_eq!(
            read_utf8_string(&dump, 9),
            Err(StringError::TruncatedString { offset: 9 })
        );
    }

    #[test]
    fn test_malformed_utf8_string() {
        let data = [2, 0, 0, 0, b'h', b'i', b'!'];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(
            read_utf8_string(&dump, 0),
            Err(StringError::MalformedString {
                offset: 0,
                detail: "missing NUL terminator"
            })
        );

        let data = [1, 0, 0, 0, 0xff, 0];
        let dump = ByteCursor::new(&data, LE);
        assert_eq!(
            read_utf8_string(&dump, 0),
            Err(StringError::MalformedString {
                offset: 0,
                detail: "invalid UTF-8"
            })
        );
        assert_eq!(
            read_utf8_string(&dump, 2),
            Err(StringError::TruncatedString { offset: 2 })
        );
    }

    #[test]
    fn test_helpers() {
        assert_eq!(utf16_to_string(&[0x61, 0x62, 0, 0x63]).unwrap(), "ab");
        assert_eq!(string_from_bytes_nul(b"foo.pdb\0\0").unwrap(), "foo.pdb");
        assert_eq!(bytes_to_hex(&[0x00, 0xab, 0x10]), "00ab10");
        assert_eq!(format_time_t(0), "1970-01-01T00:00:00Z");
    }
}
