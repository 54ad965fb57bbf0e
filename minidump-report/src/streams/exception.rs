// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use std::io;
use std::io::prelude::*;

use crate::context::RegisterContext;
use crate::cursor::ByteCursor;
use crate::error::DiagnosticKind;
use crate::streams::{optional_location, DecodeContext, Diagnostics, StreamDecoder};

/// Maximum number of entries in `exception_information`.
const EXCEPTION_MAXIMUM_PARAMETERS: usize = 15;

/// The exception that caused the dump to be written, or the request for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exception<'a> {
    /// The raw exception information from the minidump stream.
    pub raw: md::MINIDUMP_EXCEPTION_STREAM,
    /// The register context of the faulting thread at the time of the exception.
    pub context: Option<RegisterContext<'a>>,
}

impl<'a> Exception<'a> {
    /// The id of the thread that caused the crash (or otherwise requested
    /// the minidump, even if there wasn't actually a crash).
    pub fn thread_id(&self) -> u32 {
        self.raw.thread_id
    }

    pub fn code(&self) -> u32 {
        self.raw.exception_record.exception_code
    }

    pub fn address(&self) -> u64 {
        self.raw.exception_record.exception_address
    }

    /// The meaningful entries of `exception_information`.
    pub fn parameters(&self) -> &[u64] {
        let record = &self.raw.exception_record;
        let count = (record.number_parameters as usize).min(EXCEPTION_MAXIMUM_PARAMETERS);
        &record.exception_information[..count]
    }

    /// Write a human-readable description of this `Exception` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_EXCEPTION
  thread_id                                  = {:#x}
  exception_record.exception_code            = {:#x}
  exception_record.exception_flags           = {:#x}
  exception_record.exception_record          = {:#x}
  exception_record.exception_address         = {:#x}
  exception_record.number_parameters         = {}
",
            self.raw.thread_id,
            self.raw.exception_record.exception_code,
            self.raw.exception_record.exception_flags,
            self.raw.exception_record.exception_record,
            self.raw.exception_record.exception_address,
            self.raw.exception_record.number_parameters,
        )?;
        for (i, param) in self.parameters().iter().enumerate() {
            writeln!(f, "  exception_record.exception_information[{i:2}] = {param:#x}")?;
        }
        write!(
            f,
            "  thread_context.data_size                   = {}
  thread_context.rva                         = {:#x}
",
            self.raw.thread_context.data_size, self.raw.thread_context.rva
        )?;
        match self.context {
            Some(ref context) => {
                writeln!(f)?;
                context.print(f)
            }
            None => write!(f, "  (no context)\n\n"),
        }
    }
}

impl<'a> StreamDecoder<'a> for Exception<'a> {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::ExceptionStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<Exception<'a>> {
        let raw: md::MINIDUMP_EXCEPTION_STREAM = match payload.read_fixed_struct(0) {
            Ok(raw) => raw,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        let number_parameters = raw.exception_record.number_parameters;
        if number_parameters as usize > EXCEPTION_MAXIMUM_PARAMETERS {
            diag.push(DiagnosticKind::InvalidField {
                detail: format!(
                    "exception declares {number_parameters} parameters, \
                     at most {EXCEPTION_MAXIMUM_PARAMETERS} are stored"
                ),
            });
        }
        let context = match optional_location(&ctx.dump, &raw.thread_context) {
            None => None,
            Some(Err(e)) => {
                diag.push(e);
                None
            }
            Some(Ok(bytes)) => {
                let (context, problem) = RegisterContext::read(bytes, ctx.endian(), ctx.cpu);
                if let Some(problem) = problem {
                    diag.push(problem);
                }
                Some(context)
            }
        };
        Some(Exception { raw, context })
    }
}
