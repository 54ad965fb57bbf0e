// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! `ThreadListStream` and `ThreadNamesStream`.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use std::collections::BTreeMap;
use std::io;
use std::io::prelude::*;
use std::sync::Arc;

use crate::context::RegisterContext;
use crate::cursor::ByteCursor;
use crate::streams::memory::{MemoryList, MemoryRegion};
use crate::streams::{
    optional_location, read_list, DecodeContext, Diagnostics, StreamDecoder, StringTable,
};

/// The state of a thread from the process when the minidump was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread<'a> {
    /// The `MINIDUMP_THREAD` direct from the minidump file.
    pub raw: md::MINIDUMP_THREAD,
    /// From the thread names stream, if one names this thread.
    pub name: Option<Arc<str>>,
    /// The stack memory for the thread.
    ///
    /// Writers sometimes leave the stack RVA empty; the stack is then looked up by its
    /// start address in the memory list once all streams are decoded.
    pub stack: Option<MemoryRegion<'a>>,
    /// The register context, `None` when the thread record cites no context.
    pub context: Option<RegisterContext<'a>>,
}

impl<'a> Thread<'a> {
    fn read(raw: md::MINIDUMP_THREAD, ctx: &DecodeContext<'a>, diag: &mut Diagnostics) -> Thread<'a> {
        let stack = if raw.stack.memory.data_size == 0 {
            None
        } else {
            MemoryRegion::read(&raw.stack, &ctx.dump)
                .map_err(|e| diag.push(e))
                .ok()
        };
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
        Thread {
            raw,
            name: None,
            stack,
            context,
        }
    }

    pub fn thread_id(&self) -> u32 {
        self.raw.thread_id
    }

    /// Fill in the stack from `memory` if the thread record's own descriptor was empty.
    pub(crate) fn resolve_stack(&mut self, memory: &MemoryList<'a>) {
        if self.stack.is_none() && self.raw.stack.start_of_memory_range != 0 {
            self.stack = memory
                .memory_at_address(self.raw.stack.start_of_memory_range)
                .cloned();
        }
    }

    /// Write a human-readable description of this `Thread` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            r#"MINIDUMP_THREAD
  thread_id                   = {:#x}
  suspend_count               = {}
  priority_class              = {:#x}
  priority                    = {:#x}
  teb                         = {:#x}
  stack.start_of_memory_range = {:#x}
  stack.memory.data_size      = {:#x}
  stack.memory.rva            = {:#x}
  thread_context.data_size    = {:#x}
  thread_context.rva          = {:#x}
  (name)                      = "{}"

"#,
            self.raw.thread_id,
            self.raw.suspend_count,
            self.raw.priority_class,
            self.raw.priority,
            self.raw.teb,
            self.raw.stack.start_of_memory_range,
            self.raw.stack.memory.data_size,
            self.raw.stack.memory.rva,
            self.raw.thread_context.data_size,
            self.raw.thread_context.rva,
            self.name.as_deref().unwrap_or(""),
        )?;
        match self.context {
            Some(ref context) => context.print(f)?,
            None => write!(f, "  (no context)\n\n")?,
        }
        match self.stack {
            Some(ref stack) => {
                writeln!(f, "Stack")?;
                stack.print_contents(f)?;
            }
            None => writeln!(f, "No stack")?,
        }
        writeln!(f)
    }
}

/// The threads of the process, in dump order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadList<'a> {
    pub threads: Vec<Thread<'a>>,
}

impl<'a> ThreadList<'a> {
    /// The first thread with id `id`.
    pub fn get_thread(&self, id: u32) -> Option<&Thread<'a>> {
        self.threads.iter().find(|thread| thread.thread_id() == id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            r#"MinidumpThreadList
  thread_count = {}

"#,
            self.threads.len()
        )?;
        for (i, thread) in self.threads.iter().enumerate() {
            writeln!(f, "thread[{i}]")?;
            thread.print(f)?;
        }
        Ok(())
    }
}

impl<'a> StreamDecoder<'a> for ThreadList<'a> {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::ThreadListStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<ThreadList<'a>> {
        let raw_threads: Vec<md::MINIDUMP_THREAD> = read_list(&payload, ctx, diag)?;
        let threads = raw_threads
            .into_iter()
            .map(|raw| Thread::read(raw, ctx, diag))
            .collect();
        Some(ThreadList { threads })
    }
}

/// Names of threads, by thread id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadNames {
    names: BTreeMap<u32, Arc<str>>,
}

impl ThreadNames {
    pub fn get_name(&self, thread_id: u32) -> Option<&str> {
        self.names.get(&thread_id).map(|name| &**name)
    }

    /// The name of `thread_id`, shared with this table.
    pub fn shared_name(&self, thread_id: u32) -> Option<Arc<str>> {
        self.names.get(&thread_id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, &**name))
    }

    /// Write a human-readable description of this `ThreadNames` to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MinidumpThreadNames
  thread_count = {}

",
            self.names.len()
        )?;
        for (i, (thread_id, name)) in self.names.iter().enumerate() {
            writeln!(
                f,
                "thread_name[{i}]
MINIDUMP_THREAD_NAME
  thread_id = {thread_id:#x}
  name      = \"{name}\"
"
            )?;
        }
        Ok(())
    }
}

impl<'a> StreamDecoder<'a> for ThreadNames {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::ThreadNamesStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<ThreadNames> {
        let raw_names: Vec<md::MINIDUMP_THREAD_NAME> = read_list(&payload, ctx, diag)?;
        let mut names = BTreeMap::new();
        let mut strings = StringTable::new();
        for raw in raw_names {
            if names.contains_key(&raw.thread_id) {
                continue;
            }
            // An unreadable name drops only that entry.
            match strings.try_read(&ctx.dump, raw.thread_name_rva) {
                Ok(name) => {
                    names.insert(raw.thread_id, name);
                }
                Err(e) => diag.push(e),
            }
        }
        Some(ThreadNames { names })
    }
}
