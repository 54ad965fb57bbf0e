// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Breakpad's own streams: which threads wrote the dump, and failed assertions.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use num_traits::FromPrimitive;
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::io::prelude::*;

use crate::cursor::ByteCursor;
use crate::error::DiagnosticKind;
use crate::streams::{DecodeContext, Diagnostics, StreamDecoder};
use crate::strings::utf16_to_string;

/// Additional information about the process state written by Breakpad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakpadInfo {
    pub raw: md::MINIDUMP_BREAKPAD_INFO,
    /// The thread that wrote the minidump.
    pub dump_thread_id: Option<u32>,
    /// The thread that requested that a minidump be written.
    pub requesting_thread_id: Option<u32>,
}

fn option_or_invalid<T: fmt::LowerHex>(what: &Option<T>) -> Cow<'_, str> {
    match *what {
        Some(ref val) => Cow::Owned(format!("{val:#x}")),
        None => Cow::Borrowed("(invalid)"),
    }
}

impl BreakpadInfo {
    /// Write a human-readable description of this `BreakpadInfo` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_BREAKPAD_INFO
  validity             = {:#x}
  dump_thread_id       = {}
  requesting_thread_id = {}

",
            self.raw.validity,
            option_or_invalid(&self.dump_thread_id),
            option_or_invalid(&self.requesting_thread_id),
        )
    }
}

impl<'a> StreamDecoder<'a> for BreakpadInfo {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::BreakpadInfoStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        _ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<BreakpadInfo> {
        let raw: md::MINIDUMP_BREAKPAD_INFO = match payload.read_fixed_struct(0) {
            Ok(raw) => raw,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        let flags = md::BreakpadInfoValid::from_bits_truncate(raw.validity);
        let dump_thread_id = flags
            .contains(md::BreakpadInfoValid::DumpThreadId)
            .then_some(raw.dump_thread_id);
        let requesting_thread_id = flags
            .contains(md::BreakpadInfoValid::RequestingThreadId)
            .then_some(raw.requesting_thread_id);
        Some(BreakpadInfo {
            raw,
            dump_thread_id,
            requesting_thread_id,
        })
    }
}

/// Information about an assertion that caused a crash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionInfo {
    pub raw: md::MINIDUMP_ASSERTION_INFO,
    pub expression: String,
    /// The function the assertion failed in.
    pub function: String,
    /// The source file the assertion failed in.
    pub file: String,
}

impl AssertionInfo {
    pub fn line(&self) -> u32 {
        self.raw.line
    }

    /// `None` for type codes Breakpad does not define.
    pub fn assertion_type(&self) -> Option<md::AssertionType> {
        md::AssertionType::from_u32(self.raw._type)
    }

    /// Write a human-readable description of this `AssertionInfo` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MDAssertion
  expression                                 = {}
  function                                   = {}
  file                                       = {}
  line                                       = {}
  type                                       = {}

",
            self.expression, self.function, self.file, self.raw.line, self.raw._type,
        )
    }
}

impl<'a> StreamDecoder<'a> for AssertionInfo {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::AssertionInfoStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        _ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<AssertionInfo> {
        let raw: md::MINIDUMP_ASSERTION_INFO = match payload.read_fixed_struct(0) {
            Ok(raw) => raw,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        let mut field = |units: &[u16], offset: u64| {
            utf16_to_string(units).unwrap_or_else(|| {
                diag.push(DiagnosticKind::MalformedString {
                    offset,
                    detail: "invalid UTF-16".to_owned(),
                });
                String::new()
            })
        };
        // Offsets are within the payload; each field is 128 UTF-16 units.
        let expression = field(&raw.expression, 0);
        let function = field(&raw.function, 256);
        let file = field(&raw.file, 512);
        Some(AssertionInfo {
            raw,
            expression,
            function,
            file,
        })
    }
}
