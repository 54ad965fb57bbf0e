// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Bounds-checked reads over the dump buffer.

use minidump_format::format as md;
use scroll::ctx::{SizeWith, TryFromCtx};
use scroll::{Endian, Pread};

use crate::error::ReadError;

/// An immutable view of some bytes plus the byte order to read them in.
///
/// Every read checks `offset + length` against the buffer, including overflow of the
/// addition itself, and fails with [`ReadError::OutOfBounds`] instead of panicking.
#[derive(Clone, Copy, Debug)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    endian: Endian,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8], endian: Endian) -> ByteCursor<'a> {
        ByteCursor { bytes, endian }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The whole underlying buffer.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    fn out_of_bounds(&self, offset: u64, length: u64) -> ReadError {
        ReadError::OutOfBounds {
            offset,
            length,
            buffer_len: self.bytes.len(),
        }
    }

    pub fn read_bytes(&self, offset: u64, length: u64) -> Result<&'a [u8], ReadError> {
        let err = || self.out_of_bounds(offset, length);
        let start = usize::try_from(offset).map_err(|_| err())?;
        let size = usize::try_from(length).map_err(|_| err())?;
        start
            .checked_add(size)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(err)
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16, ReadError> {
        self.read_fixed_struct(offset)
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32, ReadError> {
        self.read_fixed_struct(offset)
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64, ReadError> {
        self.read_fixed_struct(offset)
    }

    /// Read any fixed-size record at `offset`.
    pub fn read_fixed_struct<T>(&self, offset: u64) -> Result<T, ReadError>
    where
        T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
        T: SizeWith<Endian>,
    {
        let size = T::size_with(&self.endian) as u64;
        let bytes = self.read_bytes(offset, size)?;
        bytes
            .pread_with(0, self.endian)
            .map_err(|_| self.out_of_bounds(offset, size))
    }

    /// The bytes a location descriptor points at.
    pub fn location(&self, loc: &md::MINIDUMP_LOCATION_DESCRIPTOR) -> Result<&'a [u8], ReadError> {
        self.read_bytes(loc.rva as u64, loc.data_size as u64)
    }

    /// A cursor over `bytes` in the same byte order, e.g. one stream's payload.
    pub fn with_bytes<'b>(&self, bytes: &'b [u8]) -> ByteCursor<'b> {
        ByteCursor::new(bytes, self.endian)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::{BE, LE};

    #[test]
    fn test_reads_in_bounds() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let cursor = ByteCursor::new(&data, LE);
        assert_eq!(cursor.read_u16(0).unwrap(), 0x0201);
        assert_eq!(cursor.read_u32(4).unwrap(), 0x08070605);
        assert_eq!(cursor.read_u64(0).unwrap(), 0x0807060504030201);
        assert_eq!(cursor.read_bytes(6, 2).unwrap(), &[7, 8]);
        assert_eq!(cursor.read_bytes(8, 0).unwrap(), &[] as &[u8]);

        let cursor = ByteCursor::new(&data, BE);
        assert_eq!(cursor.read_u32(0).unwrap(), 0x01020304);
    }

    #[test]
    fn test_reads_out_of_bounds() {
        let data = [0u8; 8];
        let cursor = ByteCursor::new(&data, LE);
        assert_eq!(
            cursor.read_u32(6),
            Err(ReadError::OutOfBounds {
                offset: 6,
                length: 4,
                buffer_len: 8
            })
        );
        assert!(cursor.read_bytes(9, 0).is_err());
        assert!(cursor.read_bytes(u64::MAX, 2).is_err());
        assert!(cursor.read_bytes(1, u64::MAX).is_err());
        assert!(cursor
            .read_fixed_struct::<md::MINIDUMP_LOCATION_DESCRIPTOR>(1)
            .is_err());
    }

    #[test]
    fn test_location() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let cursor = ByteCursor::new(&data, LE);
        let loc = md::MINIDUMP_LOCATION_DESCRIPTOR {
            data_size: 2,
            rva: 3,
        };
        assert_eq!(cursor.location(&loc).unwrap(), &[3, 4]);
        let loc = md::MINIDUMP_LOCATION_DESCRIPTOR {
            data_size: u32::MAX,
            rva: u32::MAX,
        };
        assert!(cursor.location(&loc).is_err());
    }
}
