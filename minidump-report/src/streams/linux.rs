// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The `/proc` and `/etc` files Breakpad copies verbatim into Linux dumps.

use minidump_format::format::MINIDUMP_STREAM_TYPE;
use num_traits::FromPrimitive;
use std::borrow::Cow;
use std::io;
use std::io::prelude::*;

/// The text streams kept as [`LinuxText`], in the order they are printed.
pub const LINUX_TEXT_STREAMS: [MINIDUMP_STREAM_TYPE; 6] = [
    MINIDUMP_STREAM_TYPE::LinuxCmdLine,
    MINIDUMP_STREAM_TYPE::LinuxEnviron,
    MINIDUMP_STREAM_TYPE::LinuxLsbRelease,
    MINIDUMP_STREAM_TYPE::LinuxProcStatus,
    MINIDUMP_STREAM_TYPE::LinuxCpuInfo,
    MINIDUMP_STREAM_TYPE::LinuxMaps,
];

/// One raw Linux text stream, borrowed from the dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinuxText<'a> {
    pub stream_type: MINIDUMP_STREAM_TYPE,
    pub bytes: &'a [u8],
}

impl<'a> LinuxText<'a> {
    /// Wrap `bytes` if `stream_type` is one of [`LINUX_TEXT_STREAMS`].
    pub fn new(stream_type: u32, bytes: &'a [u8]) -> Option<LinuxText<'a>> {
        let stream_type = MINIDUMP_STREAM_TYPE::from_u32(stream_type)?;
        LINUX_TEXT_STREAMS
            .contains(&stream_type)
            .then_some(LinuxText { stream_type, bytes })
    }

    pub fn name(&self) -> String {
        format!("{:?}", self.stream_type)
    }

    /// The NUL-separated pieces of the stream, lossily decoded.
    ///
    /// `cmdline` and `environ` separate their entries with NULs; the other files are one
    /// piece.
    pub fn segments(&self) -> impl Iterator<Item = Cow<'a, str>> {
        self.bytes.split(|&b| b == 0).map(String::from_utf8_lossy)
    }

    /// Write the stream with each NUL shown as `\0` followed by a line break.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "Stream {}:", self.name())?;
        let s = self.segments().collect::<Vec<_>>().join("\\0\n");
        write!(f, "{s}\n\n")
    }
}
