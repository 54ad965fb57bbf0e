// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use scroll::ctx::SizeWith;
use std::io;
use std::io::prelude::*;

use crate::cursor::ByteCursor;
use crate::error::DiagnosticKind;
use crate::streams::{DecodeContext, Diagnostics, StreamDecoder};
use crate::strings::format_time_t;

/// The revisions of the misc info stream this crate reads.
///
/// Later revisions start with the `MINIDUMP_MISC_INFO_2` fields and are read as that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawMiscInfo {
    MiscInfo(md::MINIDUMP_MISC_INFO),
    MiscInfo2(md::MINIDUMP_MISC_INFO2),
}

/// Generate a getter per field that checks the revision and, where one applies, the
/// `flags1` bit guarding the field.
macro_rules! misc_accessors {
    () => {};
    (@def $name:ident $flag:ident [$($variant:ident)+]) => {
        #[allow(unreachable_patterns)]
        pub fn $name(&self) -> Option<u32> {
            match self {
                $(
                    RawMiscInfo::$variant(ref raw) => md::MiscInfoFlags::from_bits_truncate(raw.flags1)
                        .contains(md::MiscInfoFlags::$flag)
                        .then_some(raw.$name),
                )+
                _ => None,
            }
        }
    };
    (1: $name:ident if $flag:ident, $($rest:tt)*) => {
        misc_accessors!(@def $name $flag [MiscInfo MiscInfo2]);
        misc_accessors!($($rest)*);
    };
    (2: $name:ident if $flag:ident, $($rest:tt)*) => {
        misc_accessors!(@def $name $flag [MiscInfo2]);
        misc_accessors!($($rest)*);
    };
}

impl RawMiscInfo {
    pub fn size_of_info(&self) -> u32 {
        match self {
            RawMiscInfo::MiscInfo(raw) => raw.size_of_info,
            RawMiscInfo::MiscInfo2(raw) => raw.size_of_info,
        }
    }

    pub fn flags1(&self) -> u32 {
        match self {
            RawMiscInfo::MiscInfo(raw) => raw.flags1,
            RawMiscInfo::MiscInfo2(raw) => raw.flags1,
        }
    }

    misc_accessors!(
        1: process_id if MINIDUMP_MISC1_PROCESS_ID,
        1: process_create_time if MINIDUMP_MISC1_PROCESS_TIMES,
        1: process_user_time if MINIDUMP_MISC1_PROCESS_TIMES,
        1: process_kernel_time if MINIDUMP_MISC1_PROCESS_TIMES,
        2: processor_max_mhz if MINIDUMP_MISC1_PROCESSOR_POWER_INFO,
        2: processor_current_mhz if MINIDUMP_MISC1_PROCESSOR_POWER_INFO,
        2: processor_mhz_limit if MINIDUMP_MISC1_PROCESSOR_POWER_INFO,
        2: processor_max_idle_state if MINIDUMP_MISC1_PROCESSOR_POWER_INFO,
        2: processor_current_idle_state if MINIDUMP_MISC1_PROCESSOR_POWER_INFO,
    );
}

/// Miscellaneous information about the process that wrote the dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiscInfo {
    /// The `MINIDUMP_MISC_INFO` struct direct from the minidump.
    pub raw: RawMiscInfo,
}

impl MiscInfo {
    /// Write a human-readable description of this `MiscInfo` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        macro_rules! write_simple_field {
            ($field:ident) => {
                write!(f, "  {:29}= ", stringify!($field))?;
                match self.raw.$field() {
                    Some(value) => writeln!(f, "{}", value)?,
                    None => writeln!(f, "(invalid)")?,
                }
            };
        }
        writeln!(f, "MINIDUMP_MISC_INFO")?;
        writeln!(f, "  {:29}= {}", "size_of_info", self.raw.size_of_info())?;
        writeln!(f, "  {:29}= {:x}", "flags1", self.raw.flags1())?;
        write_simple_field!(process_id);
        write!(f, "  process_create_time          = ")?;
        match self.raw.process_create_time() {
            Some(time) => writeln!(f, "{:#x} {}", time, format_time_t(time))?,
            None => writeln!(f, "(invalid)")?,
        }
        write_simple_field!(process_user_time);
        write_simple_field!(process_kernel_time);
        write_simple_field!(processor_max_mhz);
        write_simple_field!(processor_current_mhz);
        write_simple_field!(processor_mhz_limit);
        write_simple_field!(processor_max_idle_state);
        write_simple_field!(processor_current_idle_state);
        writeln!(f)
    }
}

impl<'a> StreamDecoder<'a> for MiscInfo {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::MiscInfoStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        _ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<MiscInfo> {
        let size_of_info = match payload.read_u32(0) {
            Ok(size) => size as usize,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        let endian = payload.endian();
        let raw = if size_of_info >= md::MINIDUMP_MISC_INFO2::size_with(&endian) {
            // Some writers claim a later revision than they store.
            payload
                .read_fixed_struct(0)
                .map(RawMiscInfo::MiscInfo2)
                .or_else(|_| payload.read_fixed_struct(0).map(RawMiscInfo::MiscInfo))
        } else if size_of_info >= md::MINIDUMP_MISC_INFO::size_with(&endian) {
            payload.read_fixed_struct(0).map(RawMiscInfo::MiscInfo)
        } else {
            diag.push(DiagnosticKind::InvalidField {
                detail: format!("size_of_info {size_of_info} is smaller than any known revision"),
            });
            return None;
        };
        match raw {
            Ok(raw) => Some(MiscInfo { raw }),
            Err(e) => {
                diag.push(e);
                None
            }
        }
    }
}
