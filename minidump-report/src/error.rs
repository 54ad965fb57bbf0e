// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Fatal errors, per-read errors, and the diagnostics recorded for damaged streams.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::streams::stream_name;

/// Errors that make the whole container unreadable.
///
/// These are the only errors [`parse`](crate::parse) returns; everything wrong inside an
/// individual stream becomes a [`Diagnostic`] instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FatalError {
    #[error("Missing minidump header: {len} bytes is shorter than a header")]
    TruncatedHeader { len: usize },
    #[error("Header signature {signature:#010x} is not MDMP in either byte order")]
    InvalidMagic { signature: u32 },
    #[error("Minidump version mismatch: {version:#x}")]
    UnsupportedVersion { version: u32 },
    #[error("Stream directory of {count} entries at {rva:#x} does not fit in {buffer_len} bytes")]
    DirectoryOutOfBounds {
        rva: u32,
        count: u32,
        buffer_len: usize,
    },
}

impl FatalError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            FatalError::TruncatedHeader { .. } => "TruncatedHeader",
            FatalError::InvalidMagic { .. } => "InvalidMagic",
            FatalError::UnsupportedVersion { .. } => "UnsupportedVersion",
            FatalError::DirectoryOutOfBounds { .. } => "DirectoryOutOfBounds",
        }
    }
}

/// A read through a [`ByteCursor`](crate::ByteCursor) that left the buffer.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("read of {length} bytes at {offset:#x} is outside the {buffer_len} byte buffer")]
    OutOfBounds {
        offset: u64,
        length: u64,
        buffer_len: usize,
    },
}

impl ReadError {
    pub fn name(&self) -> &'static str {
        match self {
            ReadError::OutOfBounds { .. } => "OutOfBounds",
        }
    }
}

/// Failure to decode a `MINIDUMP_STRING`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StringError {
    #[error("string at {offset:#x} runs past the end of the buffer")]
    TruncatedString { offset: u64 },
    #[error("string at {offset:#x} is malformed: {detail}")]
    MalformedString { offset: u64, detail: &'static str },
}

impl StringError {
    pub fn name(&self) -> &'static str {
        match self {
            StringError::TruncatedString { .. } => "TruncatedString",
            StringError::MalformedString { .. } => "MalformedString",
        }
    }
}

/// A non-fatal problem found while decoding one stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Type code of the stream, as it appears in the directory.
    pub stream_type: u32,
    /// Position of the stream in the directory.
    pub index: usize,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(stream_type: u32, index: usize, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic {
            stream_type,
            index,
            kind,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (directory entry {}): {}",
            stream_name(self.stream_type),
            self.index,
            self.kind
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum DiagnosticKind {
    /// The payload, or a fixed-size part of it, lies outside the buffer.
    #[error("stream is truncated: {detail}")]
    TruncatedStream { detail: String },
    /// A list declared more entries than its payload holds.
    #[error("recovered {recovered} of {declared} declared entries")]
    PartialStream { recovered: u64, declared: u64 },
    #[error("string at {offset:#x} runs past the end of the buffer")]
    TruncatedString { offset: u64 },
    #[error("string at {offset:#x} is malformed: {detail}")]
    MalformedString { offset: u64, detail: String },
    /// A register context whose CPU tag names no layout this crate decodes.
    #[error("unrecognized register context (context_flags {context_flags:#x})")]
    UnrecognizedArchitecture { context_flags: u32 },
    #[error("duplicate stream ignored; directory entry {kept_index} is used")]
    DuplicateSingletonStream { kept_index: usize },
    /// A decoded record whose fields contradict each other; the record is dropped.
    #[error("invalid field: {detail}")]
    InvalidField { detail: String },
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::TruncatedStream { .. } => "TruncatedStream",
            DiagnosticKind::PartialStream { .. } => "PartialStream",
            DiagnosticKind::TruncatedString { .. } => "TruncatedString",
            DiagnosticKind::MalformedString { .. } => "MalformedString",
            DiagnosticKind::UnrecognizedArchitecture { .. } => "UnrecognizedArchitecture",
            DiagnosticKind::DuplicateSingletonStream { .. } => "DuplicateSingletonStream",
            DiagnosticKind::InvalidField { .. } => "InvalidField",
        }
    }
}

impl From<ReadError> for DiagnosticKind {
    fn from(err: ReadError) -> Self {
        DiagnosticKind::TruncatedStream {
            detail: err.to_string(),
        }
    }
}

impl From<StringError> for DiagnosticKind {
    fn from(err: StringError) -> Self {
        match err {
            StringError::TruncatedString { offset } => DiagnosticKind::TruncatedString { offset },
            StringError::MalformedString { offset, detail } => DiagnosticKind::MalformedString {
                offset,
                detail: detail.to_owned(),
            },
        }
    }
}
