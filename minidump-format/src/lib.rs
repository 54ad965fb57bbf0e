// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Raw layouts of the minidump container.
//!
//! Everything in [`format`] mirrors a record as it sits on disk, so that it can be read
//! with `scroll`'s `Pread` in either byte order. Interpreting those records (bounds
//! checking, string resolution, diagnostics) is the job of the `minidump-report` crate.

pub mod format;
