// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A salvaging decoder for the minidump crash dump format.
//!
//! [`parse`] turns the bytes of a minidump into a [`Report`]. Only a damaged header or
//! stream directory makes it fail; any problem inside an individual stream is recorded in
//! [`Report::diagnostics`] and decoding carries on with the rest of the dump.
//!
//! # Examples
//!
//! ```
//! let bytes = std::fs::read("crash.dmp").unwrap_or_default();
//! match minidump_report::parse(&bytes) {
//!     Ok(report) => {
//!         for module in report.modules.iter().flat_map(|list| list.iter()) {
//!             println!("{:#x} {}", module.base_address(), module.code_file());
//!         }
//!         for diagnostic in &report.diagnostics {
//!             eprintln!("{diagnostic}");
//!         }
//!     }
//!     Err(err) => eprintln!("not a usable minidump: {err}"),
//! }
//! ```

pub use minidump_format::format;

pub mod context;
mod cursor;
mod error;
mod header;
mod report;
pub mod streams;
mod strings;
pub mod system_info;

pub use crate::context::RegisterContext;
pub use crate::cursor::ByteCursor;
pub use crate::error::{Diagnostic, DiagnosticKind, FatalError, ReadError, StringError};
pub use crate::header::DirectoryEntry;
pub use crate::report::{
    DuplicatePolicy, ParseOptions, PartialListPolicy, Report, UnknownStream,
};
pub use crate::streams::breakpad::{AssertionInfo, BreakpadInfo};
pub use crate::streams::crashpad::{Annotation, CrashpadInfo, ModuleCrashpadInfo};
pub use crate::streams::exception::Exception;
pub use crate::streams::linux::LinuxText;
pub use crate::streams::memory::{Memory64List, MemoryList, MemoryRegion};
pub use crate::streams::memory_info::{MemoryInfo, MemoryInfoList};
pub use crate::streams::misc_info::{MiscInfo, RawMiscInfo};
pub use crate::streams::module::{CodeView, Module, ModuleList, UnloadedModule, UnloadedModuleList};
pub use crate::streams::system_info::SystemInfo;
pub use crate::streams::thread::{Thread, ThreadList, ThreadNames};
pub use crate::streams::{stream_name, stream_vendor};
pub use crate::strings::read_string;

/// Decode `bytes` as a minidump with the default [`ParseOptions`].
///
/// Fails only when the header or stream directory cannot be read; see
/// [`Report::diagnostics`] for everything else.
pub fn parse(bytes: &[u8]) -> Result<Report<'_>, FatalError> {
    parse_with_options(bytes, &ParseOptions::default())
}

/// Decode `bytes` as a minidump, resolving duplicate and truncated streams as `options` say.
pub fn parse_with_options<'a>(
    bytes: &'a [u8],
    options: &ParseOptions,
) -> Result<Report<'a>, FatalError> {
    Report::assemble(bytes, options)
}
