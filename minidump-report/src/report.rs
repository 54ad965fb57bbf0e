// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Dispatching directory entries to their decoders and assembling the [`Report`].

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use num_traits::FromPrimitive;
use scroll::{Endian, LE};
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::io::prelude::*;
use std::sync::Arc;
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cursor::ByteCursor;
use crate::error::{Diagnostic, DiagnosticKind, FatalError};
use crate::header::{print_directory, print_header, read_directory, read_header, DirectoryEntry};
use crate::streams::breakpad::{AssertionInfo, BreakpadInfo};
use crate::streams::crashpad::{Annotation, CrashpadInfo};
use crate::streams::exception::Exception;
use crate::streams::linux::LinuxText;
use crate::streams::memory::{Memory64List, MemoryList, MemoryRegion};
use crate::streams::memory_info::MemoryInfoList;
use crate::streams::misc_info::MiscInfo;
use crate::streams::module::{ModuleList, UnloadedModuleList};
use crate::streams::system_info::SystemInfo;
use crate::streams::thread::{Thread, ThreadList, ThreadNames};
use crate::streams::{stream_name, stream_vendor, DecodeContext, Diagnostics, StreamDecoder};
use crate::strings::{bytes_to_hex, format_time_t};

/// Which copy of a repeated stream is decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The first entry in directory order.
    #[default]
    FirstWins,
    /// The last entry in directory order.
    LastWins,
}

/// What to do with a list stream whose declared count overflows its payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartialListPolicy {
    /// Keep the entries that fit.
    #[default]
    Keep,
    /// Drop the whole stream.
    Discard,
}

/// Knobs for [`parse_with_options`](crate::parse_with_options).
///
/// Both policies record a diagnostic whichever way they resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    pub duplicates: DuplicatePolicy,
    pub partial_lists: PartialListPolicy,
    /// Decode directory entries on the rayon pool. Ignored without the `parallel` feature.
    pub parallel: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            duplicates: DuplicatePolicy::default(),
            partial_lists: PartialListPolicy::default(),
            parallel: cfg!(feature = "parallel"),
        }
    }
}

impl ParseOptions {
    pub fn new() -> ParseOptions {
        ParseOptions::default()
    }

    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn partial_lists(mut self, policy: PartialListPolicy) -> Self {
        self.partial_lists = policy;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A stream this crate does not decode, kept as it was in the dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownStream<'a> {
    /// Position of the stream in the directory.
    pub index: usize,
    pub stream_type: u32,
    pub bytes: &'a [u8],
}

impl UnknownStream<'_> {
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "Stream {} ({}), {} bytes
  {}

",
            stream_name(self.stream_type),
            stream_vendor(self.stream_type),
            self.bytes.len(),
            bytes_to_hex(self.bytes),
        )
    }
}

/// Everything that could be decoded from one minidump.
///
/// Borrowed data (memory contents, register contexts, raw streams) points into the buffer
/// passed to [`parse`](crate::parse).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report<'a> {
    /// Byte order of the whole dump.
    pub endian: Endian,
    pub header: md::MINIDUMP_HEADER,
    pub directory: Vec<DirectoryEntry>,
    pub system_info: Option<SystemInfo>,
    pub exception: Option<Exception<'a>>,
    pub misc_info: Option<MiscInfo>,
    pub breakpad_info: Option<BreakpadInfo>,
    pub assertion: Option<AssertionInfo>,
    pub crashpad_info: Option<CrashpadInfo>,
    pub modules: Option<ModuleList<'a>>,
    pub unloaded_modules: Option<UnloadedModuleList>,
    /// Threads with names attached and stacks resolved.
    pub threads: Option<ThreadList<'a>>,
    pub thread_names: Option<ThreadNames>,
    /// Regions of the memory list followed by those of the 64-bit memory list.
    pub memory: Option<MemoryList<'a>>,
    pub memory_info: Option<MemoryInfoList>,
    /// Linux text streams, in directory order.
    pub linux: Vec<LinuxText<'a>>,
    /// Streams of types not decoded here, and repeated list streams, in directory order.
    pub unknown_streams: Vec<UnknownStream<'a>>,
    /// Everything that went wrong, in directory order.
    pub diagnostics: Vec<Diagnostic>,
}

enum Decoded<'a> {
    SystemInfo(SystemInfo),
    Exception(Exception<'a>),
    MiscInfo(MiscInfo),
    BreakpadInfo(BreakpadInfo),
    Assertion(AssertionInfo),
    CrashpadInfo(CrashpadInfo),
    Modules(ModuleList<'a>),
    UnloadedModules(UnloadedModuleList),
    Threads(ThreadList<'a>),
    ThreadNames(ThreadNames),
    Memory(MemoryList<'a>),
    Memory64(Memory64List<'a>),
    MemoryInfo(MemoryInfoList),
    Linux(LinuxText<'a>),
    Unknown(UnknownStream<'a>),
}

type EntryResult<'a> = (Option<Decoded<'a>>, Vec<Diagnostic>);

/// What happens to one directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Plan {
    /// `UnusedStream` entries carry nothing.
    Skip,
    Decode,
    Duplicate { kept_index: usize },
}

/// Stream types decoded into a field of the report, and so allowed only once.
fn is_singleton(stream_type: u32) -> bool {
    use MINIDUMP_STREAM_TYPE::*;
    match MINIDUMP_STREAM_TYPE::from_u32(stream_type) {
        Some(
            SystemInfoStream | ExceptionStream | MiscInfoStream | BreakpadInfoStream
            | AssertionInfoStream | CrashpadInfoStream,
        ) => true,
        Some(_) => is_list(stream_type) || LinuxText::new(stream_type, &[]).is_some(),
        None => false,
    }
}

fn is_list(stream_type: u32) -> bool {
    use MINIDUMP_STREAM_TYPE::*;
    matches!(
        MINIDUMP_STREAM_TYPE::from_u32(stream_type),
        Some(
            ModuleListStream
                | UnloadedModuleListStream
                | ThreadListStream
                | ThreadNamesStream
                | MemoryListStream
                | Memory64ListStream
                | MemoryInfoListStream
        )
    )
}

fn plan_entries(directory: &[DirectoryEntry], policy: DuplicatePolicy) -> Vec<Plan> {
    let mut kept: BTreeMap<u32, usize> = BTreeMap::new();
    for entry in directory {
        if !is_singleton(entry.stream_type) {
            continue;
        }
        match policy {
            DuplicatePolicy::FirstWins => {
                kept.entry(entry.stream_type).or_insert(entry.index);
            }
            DuplicatePolicy::LastWins => {
                kept.insert(entry.stream_type, entry.index);
            }
        }
    }
    directory
        .iter()
        .map(|entry| {
            if entry.stream_type == MINIDUMP_STREAM_TYPE::UnusedStream as u32 {
                return Plan::Skip;
            }
            match kept.get(&entry.stream_type) {
                Some(&kept_index) if kept_index != entry.index => Plan::Duplicate { kept_index },
                _ => Plan::Decode,
            }
        })
        .collect()
}

fn decode_as<'a, T, F>(
    payload: ByteCursor<'a>,
    ctx: &DecodeContext<'a>,
    diag: &mut Diagnostics,
    wrap: F,
) -> Option<Decoded<'a>>
where
    T: StreamDecoder<'a>,
    F: FnOnce(T) -> Decoded<'a>,
{
    T::decode(payload, ctx, diag).map(wrap)
}

fn decode_entry<'a>(entry: &DirectoryEntry, plan: Plan, ctx: &DecodeContext<'a>) -> EntryResult<'a> {
    use MINIDUMP_STREAM_TYPE::*;

    let mut diag = Diagnostics::new(entry);
    match plan {
        Plan::Skip => {
            trace!("skipping unused directory entry {}", entry.index);
            return (None, vec![]);
        }
        Plan::Duplicate { kept_index } => {
            diag.push(DiagnosticKind::DuplicateSingletonStream { kept_index });
            let opaque = ctx
                .dump
                .location(&entry.location)
                .ok()
                .filter(|_| is_list(entry.stream_type))
                .map(|bytes| {
                    Decoded::Unknown(UnknownStream {
                        index: entry.index,
                        stream_type: entry.stream_type,
                        bytes,
                    })
                });
            return (opaque, diag.into_vec());
        }
        Plan::Decode => {}
    }
    let bytes = match ctx.dump.location(&entry.location) {
        Ok(bytes) => bytes,
        Err(e) => {
            diag.push(DiagnosticKind::TruncatedStream {
                detail: format!("payload: {e}"),
            });
            return (None, diag.into_vec());
        }
    };

    debug!(
        "decoding {} from directory entry {}",
        stream_name(entry.stream_type),
        entry.index
    );
    let payload = ByteCursor::new(bytes, ctx.endian());
    let diag_ref = &mut diag;
    let decoded = match MINIDUMP_STREAM_TYPE::from_u32(entry.stream_type) {
        Some(SystemInfoStream) => decode_as(payload, ctx, diag_ref, Decoded::SystemInfo),
        Some(ExceptionStream) => decode_as(payload, ctx, diag_ref, Decoded::Exception),
        Some(MiscInfoStream) => decode_as(payload, ctx, diag_ref, Decoded::MiscInfo),
        Some(BreakpadInfoStream) => decode_as(payload, ctx, diag_ref, Decoded::BreakpadInfo),
        Some(AssertionInfoStream) => decode_as(payload, ctx, diag_ref, Decoded::Assertion),
        Some(CrashpadInfoStream) => decode_as(payload, ctx, diag_ref, Decoded::CrashpadInfo),
        Some(ModuleListStream) => decode_as(payload, ctx, diag_ref, Decoded::Modules),
        Some(UnloadedModuleListStream) => {
            decode_as(payload, ctx, diag_ref, Decoded::UnloadedModules)
        }
        Some(ThreadListStream) => decode_as(payload, ctx, diag_ref, Decoded::Threads),
        Some(ThreadNamesStream) => decode_as(payload, ctx, diag_ref, Decoded::ThreadNames),
        Some(MemoryListStream) => decode_as(payload, ctx, diag_ref, Decoded::Memory),
        Some(Memory64ListStream) => decode_as(payload, ctx, diag_ref, Decoded::Memory64),
        Some(MemoryInfoListStream) => decode_as(payload, ctx, diag_ref, Decoded::MemoryInfo),
        _ => Some(match LinuxText::new(entry.stream_type, bytes) {
            Some(text) => Decoded::Linux(text),
            None => Decoded::Unknown(UnknownStream {
                index: entry.index,
                stream_type: entry.stream_type,
                bytes,
            }),
        }),
    };
    (decoded, diag.into_vec())
}

#[cfg(feature = "parallel")]
fn decode_all<'a>(
    directory: &[DirectoryEntry],
    plans: &[Plan],
    ctx: &DecodeContext<'a>,
    parallel: bool,
) -> Vec<EntryResult<'a>> {
    if parallel {
        directory
            .par_iter()
            .zip(plans.par_iter())
            .map(|(entry, &plan)| decode_entry(entry, plan, ctx))
            .collect()
    } else {
        decode_all_sequential(directory, plans, ctx)
    }
}

#[cfg(not(feature = "parallel"))]
fn decode_all<'a>(
    directory: &[DirectoryEntry],
    plans: &[Plan],
    ctx: &DecodeContext<'a>,
    _parallel: bool,
) -> Vec<EntryResult<'a>> {
    decode_all_sequential(directory, plans, ctx)
}

fn decode_all_sequential<'a>(
    directory: &[DirectoryEntry],
    plans: &[Plan],
    ctx: &DecodeContext<'a>,
) -> Vec<EntryResult<'a>> {
    directory
        .iter()
        .zip(plans)
        .map(|(entry, &plan)| decode_entry(entry, plan, ctx))
        .collect()
}

impl<'a> Report<'a> {
    pub(crate) fn assemble(bytes: &'a [u8], options: &ParseOptions) -> Result<Report<'a>, FatalError> {
        let (header, endian) = read_header(bytes)?;
        let dump = ByteCursor::new(bytes, endian);
        let directory = read_directory(&dump, &header)?;
        debug!(
            "{} endian minidump with {} streams",
            if endian == LE { "little" } else { "big" },
            directory.len()
        );
        let plans = plan_entries(&directory, options.duplicates);

        let mut ctx = DecodeContext {
            dump,
            cpu: None,
            os: None,
            partial_lists: options.partial_lists,
        };

        // Register contexts need the CPU, so system info goes first.
        let system_info_entry = directory.iter().zip(&plans).find(|&(entry, plan)| {
            *plan == Plan::Decode && entry.stream_type == SystemInfo::STREAM_TYPE
        });
        let mut system_info_result = None;
        if let Some((entry, &plan)) = system_info_entry {
            let result = decode_entry(entry, plan, &ctx);
            if let Some(Decoded::SystemInfo(ref info)) = result.0 {
                ctx.cpu = Some(info.cpu);
                ctx.os = Some(info.os);
            }
            system_info_result = Some((entry.index, result));
        }

        let system_info_index = system_info_result.as_ref().map(|(index, _)| *index);
        let plans_without_system_info: Vec<Plan> = plans
            .iter()
            .zip(&directory)
            .map(|(&plan, entry)| {
                if system_info_index == Some(entry.index) {
                    Plan::Skip
                } else {
                    plan
                }
            })
            .collect();
        let mut results = decode_all(&directory, &plans_without_system_info, &ctx, options.parallel);
        if let Some((index, result)) = system_info_result {
            results[index] = result;
        }

        let mut report = Report {
            endian,
            header,
            directory,
            system_info: None,
            exception: None,
            misc_info: None,
            breakpad_info: None,
            assertion: None,
            crashpad_info: None,
            modules: None,
            unloaded_modules: None,
            threads: None,
            thread_names: None,
            memory: None,
            memory_info: None,
            linux: vec![],
            unknown_streams: vec![],
            diagnostics: vec![],
        };
        let mut memory64 = None;
        for (decoded, diagnostics) in results {
            report.diagnostics.extend(diagnostics);
            match decoded {
                None => {}
                Some(Decoded::SystemInfo(info)) => report.system_info = Some(info),
                Some(Decoded::Exception(exception)) => report.exception = Some(exception),
                Some(Decoded::MiscInfo(misc)) => report.misc_info = Some(misc),
                Some(Decoded::BreakpadInfo(info)) => report.breakpad_info = Some(info),
                Some(Decoded::Assertion(assertion)) => report.assertion = Some(assertion),
                Some(Decoded::CrashpadInfo(info)) => report.crashpad_info = Some(info),
                Some(Decoded::Modules(modules)) => report.modules = Some(modules),
                Some(Decoded::UnloadedModules(modules)) => report.unloaded_modules = Some(modules),
                Some(Decoded::Threads(threads)) => report.threads = Some(threads),
                Some(Decoded::ThreadNames(names)) => report.thread_names = Some(names),
                Some(Decoded::Memory(memory)) => report.memory = Some(memory),
                Some(Decoded::Memory64(memory)) => memory64 = Some(memory),
                Some(Decoded::MemoryInfo(info)) => report.memory_info = Some(info),
                Some(Decoded::Linux(text)) => report.linux.push(text),
                Some(Decoded::Unknown(stream)) => report.unknown_streams.push(stream),
            }
        }

        if let Some(memory64) = memory64 {
            let memory64 = MemoryList::from_regions(memory64.regions);
            report.memory = Some(match report.memory.take() {
                Some(memory) => memory.merge(memory64),
                None => memory64,
            });
        }
        if let Some(threads) = report.threads.as_mut() {
            for thread in threads.threads.iter_mut() {
                if let Some(names) = report.thread_names.as_ref() {
                    thread.name = names.shared_name(thread.thread_id());
                }
                if let Some(memory) = report.memory.as_ref() {
                    thread.resolve_stack(memory);
                }
            }
        }
        Ok(report)
    }

    /// The first thread with id `thread_id`.
    pub fn thread(&self, thread_id: u32) -> Option<&Thread<'a>> {
        self.threads.as_ref()?.get_thread(thread_id)
    }

    /// The thread named by the exception stream.
    pub fn crashing_thread(&self) -> Option<&Thread<'a>> {
        self.thread(self.exception.as_ref()?.thread_id())
    }

    pub fn memory_at_address(&self, address: u64) -> Option<&MemoryRegion<'a>> {
        self.memory.as_ref()?.memory_at_address(address)
    }

    pub fn linux_stream(&self, stream_type: MINIDUMP_STREAM_TYPE) -> Option<&LinuxText<'a>> {
        self.linux.iter().find(|text| text.stream_type == stream_type)
    }

    /// Write a human-readable description of everything in the report to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        print_header(f, &self.header)?;
        print_directory(f, &self.directory)?;
        if let Some(ref threads) = self.threads {
            threads.print(f)?;
        }
        if let Some(ref modules) = self.modules {
            modules.print(f)?;
        }
        if let Some(ref modules) = self.unloaded_modules {
            modules.print(f)?;
        }
        if let Some(ref memory) = self.memory {
            memory.print(f)?;
        }
        if let Some(ref memory_info) = self.memory_info {
            memory_info.print(f)?;
        }
        if let Some(ref exception) = self.exception {
            exception.print(f)?;
        }
        if let Some(ref assertion) = self.assertion {
            assertion.print(f)?;
        }
        if let Some(ref system_info) = self.system_info {
            system_info.print(f)?;
        }
        if let Some(ref misc_info) = self.misc_info {
            misc_info.print(f)?;
        }
        if let Some(ref breakpad_info) = self.breakpad_info {
            breakpad_info.print(f)?;
        }
        if let Some(ref crashpad_info) = self.crashpad_info {
            crashpad_info.print(f)?;
        }
        if let Some(ref thread_names) = self.thread_names {
            thread_names.print(f)?;
        }
        for text in &self.linux {
            text.print(f)?;
        }
        for stream in &self.unknown_streams {
            stream.print(f)?;
        }
        self.print_diagnostics(f)
    }

    pub fn print_diagnostics<T: Write>(&self, f: &mut T) -> io::Result<()> {
        if self.diagnostics.is_empty() {
            return Ok(());
        }
        writeln!(f, "Diagnostics ({}):", self.diagnostics.len())?;
        for diagnostic in &self.diagnostics {
            writeln!(f, "  {diagnostic}")?;
        }
        writeln!(f)
    }

    /// Write the report as JSON.
    pub fn print_json<T: Write>(&self, f: &mut T, pretty: bool) -> Result<(), serde_json::Error> {
        fn json_hex(value: u64) -> String {
            format!("{value:#x}")
        }

        let output = json!({
            "endian": if self.endian == LE { "little" } else { "big" },
            "header": {
                "stream_count": self.header.stream_count,
                "time_date_stamp": format_time_t(self.header.time_date_stamp),
                "flags": json_hex(self.header.flags),
            },
            "system_info": self.system_info.as_ref().map(|sys| json!({
                "os": sys.os.long_name(),
                "os_ver": sys.os_version(),
                "cpu_arch": sys.cpu.to_string(),
                "cpu_info": sys.cpu_info,
                "cpu_count": sys.raw.number_of_processors,
            })),
            "crash_info": self.exception.as_ref().map(|exception| json!({
                "thread_id": exception.thread_id(),
                "code": json_hex(exception.code() as u64),
                "address": json_hex(exception.address()),
                "parameters": exception.parameters().iter().map(|&p| json_hex(p)).collect::<Vec<_>>(),
                "instruction_pointer": exception.context.as_ref()
                    .and_then(|context| context.instruction_pointer())
                    .map(json_hex),
            })),
            "assertion": self.assertion.as_ref().map(|assertion| json!({
                "expression": assertion.expression,
                "function": assertion.function,
                "file": assertion.file,
                "line": assertion.line(),
            })),
            "breakpad_info": self.breakpad_info.as_ref().map(|info| json!({
                "dump_thread_id": info.dump_thread_id,
                "requesting_thread_id": info.requesting_thread_id,
            })),
            "crashpad_info": self.crashpad_info.as_ref().map(crashpad_json),
            "misc_info": self.misc_info.as_ref().map(|misc| json!({
                "process_id": misc.raw.process_id(),
                "process_create_time": misc.raw.process_create_time().map(format_time_t),
            })),
            "modules": self.modules.iter().flat_map(|list| list.iter()).map(|module| json!({
                "base_addr": json_hex(module.base_address()),
                "end_addr": json_hex(module.base_address().saturating_add(module.size())),
                "filename": module.code_file(),
                "code_id": module.code_identifier().map(|id| id.to_string()),
                "debug_file": module.debug_file(),
                "debug_id": module.debug_identifier().map(|id| id.breakpad().to_string()),
                "version": module.version(),
            })).collect::<Vec<_>>(),
            "unloaded_modules": self.unloaded_modules.iter().flat_map(|list| list.iter()).map(|module| json!({
                "base_addr": json_hex(module.base_address()),
                "end_addr": json_hex(module.base_address().saturating_add(module.size())),
                "filename": module.code_file(),
                "code_id": module.code_identifier().to_string(),
            })).collect::<Vec<_>>(),
            "threads": self.threads.iter().flat_map(|list| list.threads.iter()).map(|thread| json!({
                "thread_id": thread.thread_id(),
                "thread_name": thread.name.as_deref(),
                "stack_start": json_hex(thread.raw.stack.start_of_memory_range),
                "stack_size": thread.stack.as_ref().map(|stack| stack.size),
                "instruction_pointer": thread.context.as_ref()
                    .and_then(|context| context.instruction_pointer())
                    .map(json_hex),
            })).collect::<Vec<_>>(),
            "memory_regions": self.memory.iter().flat_map(|list| list.iter()).map(|region| json!({
                "base_addr": json_hex(region.base_address),
                "size": region.size,
            })).collect::<Vec<_>>(),
            "memory_info_count": self.memory_info.as_ref().map(|info| info.len()),
            "linux_streams": self.linux.iter().map(|text| text.name()).collect::<Vec<_>>(),
            "unknown_streams": self.unknown_streams.iter().map(|stream| json!({
                "index": stream.index,
                "stream_type": json_hex(stream.stream_type as u64),
                "vendor": stream_vendor(stream.stream_type),
                "size": stream.bytes.len(),
            })).collect::<Vec<_>>(),
            "diagnostics": self.diagnostics,
        });

        if pretty {
            serde_json::to_writer_pretty(f, &output)
        } else {
            serde_json::to_writer(f, &output)
        }
    }
}

fn annotations_json<'s>(
    annotations: impl IntoIterator<Item = (&'s Arc<str>, &'s Arc<str>)>,
) -> serde_json::Map<String, serde_json::Value> {
    annotations
        .into_iter()
        .map(|(key, value)| (key.to_string(), json!(&**value)))
        .collect()
}

fn crashpad_json(info: &CrashpadInfo) -> serde_json::Value {
    let module_list = info
        .module_list
        .iter()
        .map(|module| {
            let annotation_objects: serde_json::Map<_, _> = module
                .annotation_objects
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        Annotation::String(string) => json!(&**string),
                        Annotation::Invalid => json!(null),
                        Annotation::UserDefined(raw) | Annotation::Unsupported(raw) => {
                            json!({ "type": raw.ty })
                        }
                    };
                    (name.to_string(), value)
                })
                .collect();
            json!({
                "module_index": module.module_index,
                "list_annotations": module.list_annotations.iter().map(|a| &**a).collect::<Vec<_>>(),
                "simple_annotations": annotations_json(&module.simple_annotations),
                "annotation_objects": annotation_objects,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "version": info.raw.version,
        "report_id": info.report_id(),
        "client_id": info.client_id(),
        "simple_annotations": annotations_json(&info.simple_annotations),
        "module_list": module_list,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{parse, parse_with_options};
    use minidump_synth::{
        AnnotationValue, CrashpadInfo as SynthCrashpadInfo, DumpString, Module as SynthModule,
        ModuleCrashpadInfo, SimpleStream, SynthMinidump, SystemInfo as SynthSystemInfo,
    };
    use test_assembler::{Endian as SynthEndian, Section};

    fn entry(index: usize, stream_type: u32) -> DirectoryEntry {
        DirectoryEntry {
            index,
            stream_type,
            location: Default::default(),
        }
    }

    #[test]
    fn test_plan_entries() {
        let directory = vec![
            entry(0, 7),
            entry(1, 0),
            entry(2, 0xdead),
            entry(3, 7),
            entry(4, 0xdead),
        ];
        assert_eq!(
            plan_entries(&directory, DuplicatePolicy::FirstWins),
            vec![
                Plan::Decode,
                Plan::Skip,
                Plan::Decode,
                Plan::Duplicate { kept_index: 0 },
                Plan::Decode
            ]
        );
        assert_eq!(
            plan_entries(&directory, DuplicatePolicy::LastWins)[0],
            Plan::Duplicate { kept_index: 3 }
        );
    }

    #[test]
    fn test_options_builder() {
        let options = ParseOptions::new()
            .duplicates(DuplicatePolicy::LastWins)
            .partial_lists(PartialListPolicy::Discard)
            .parallel(false);
        assert_eq!(options.duplicates, DuplicatePolicy::LastWins);
        assert_eq!(options.partial_lists, PartialListPolicy::Discard);
        assert!(!options.parallel);
        assert_eq!(ParseOptions::default().duplicates, DuplicatePolicy::FirstWins);
    }

    fn system_info(cpu: md::ProcessorArchitecture) -> SynthSystemInfo {
        SynthSystemInfo::new(SynthEndian::Little).set_processor_architecture(cpu as u16)
    }

    #[test]
    fn test_duplicate_system_info() {
        let dump = SynthMinidump::new()
            .add_system_info(system_info(
                md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_AMD64,
            ))
            .add_system_info(system_info(
                md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_ARM64,
            ))
            .finish()
            .unwrap();

        let report = parse(&dump).unwrap();
        assert_eq!(
            report.system_info.as_ref().unwrap().cpu,
            crate::system_info::Cpu::X86_64
        );
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::new(
                SystemInfo::STREAM_TYPE,
                1,
                DiagnosticKind::DuplicateSingletonStream { kept_index: 0 }
            )]
        );
        assert!(report.unknown_streams.is_empty());

        let options = ParseOptions::new().duplicates(DuplicatePolicy::LastWins);
        let report = parse_with_options(&dump, &options).unwrap();
        assert_eq!(
            report.system_info.as_ref().unwrap().cpu,
            crate::system_info::Cpu::Arm64
        );
        assert_eq!(report.diagnostics[0].index, 0);
    }

    #[test]
    fn test_duplicate_list_kept_opaque() {
        let name = DumpString::new("a.so", SynthEndian::Little);
        let module = SynthModule::new(SynthEndian::Little, 0x1000, 0x1000, &name, 0, 0, None);
        // Appended right away, so it is entry 0 and the module list built at the end is entry 1.
        let empty = Section::new().D32(0);
        let dump = SynthMinidump::new()
            .add_stream(SimpleStream {
                stream_type: MINIDUMP_STREAM_TYPE::ModuleListStream as u32,
                section: empty,
            })
            .add_module(module)
            .add(name)
            .finish()
            .unwrap();

        let report = parse(&dump).unwrap();
        assert!(report.modules.as_ref().unwrap().is_empty());
        assert_eq!(report.unknown_streams.len(), 1);
        assert_eq!(report.unknown_streams[0].index, 1);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::new(
                MINIDUMP_STREAM_TYPE::ModuleListStream as u32,
                1,
                DiagnosticKind::DuplicateSingletonStream { kept_index: 0 }
            )]
        );

        let options = ParseOptions::new().duplicates(DuplicatePolicy::LastWins);
        let report = parse_with_options(&dump, &options).unwrap();
        assert_eq!(report.modules.as_ref().unwrap().len(), 1);
        assert_eq!(report.unknown_streams[0].bytes, &[0, 0, 0, 0]);
    }

    #[test]
    fn test_unused_duplicate_out_of_bounds() {
        // The raw entry is appended right away, so it is entry 0.
        let dump = SynthMinidump::new()
            .add_raw_directory_entry(SystemInfo::STREAM_TYPE, 56, 0xffff_ff00)
            .add_system_info(system_info(
                md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_ARM64,
            ))
            .add_raw_directory_entry(
                MINIDUMP_STREAM_TYPE::ModuleListStream as u32,
                4,
                0xffff_ff00,
            )
            .add_stream(SimpleStream {
                stream_type: MINIDUMP_STREAM_TYPE::ModuleListStream as u32,
                section: Section::new().D32(0),
            })
            .finish()
            .unwrap();
        let options = ParseOptions::new().duplicates(DuplicatePolicy::LastWins);
        let report = parse_with_options(&dump, &options).unwrap();
        assert_eq!(
            report.system_info.as_ref().unwrap().cpu,
            crate::system_info::Cpu::Arm64
        );
        assert!(report.modules.as_ref().unwrap().is_empty());
        assert!(report.unknown_streams.is_empty());
        assert_eq!(
            report.diagnostics,
            vec![
                Diagnostic::new(
                    SystemInfo::STREAM_TYPE,
                    0,
                    DiagnosticKind::DuplicateSingletonStream { kept_index: 3 }
                ),
                Diagnostic::new(
                    MINIDUMP_STREAM_TYPE::ModuleListStream as u32,
                    1,
                    DiagnosticKind::DuplicateSingletonStream { kept_index: 2 }
                ),
            ]
        );
    }

    #[test]
    fn test_unused_and_out_of_bounds_entries() {
        let dump = SynthMinidump::new()
            .add_raw_directory_entry(0, 0, 0)
            .add_raw_directory_entry(MINIDUMP_STREAM_TYPE::ExceptionStream as u32, 168, 0xffff_ff00)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.exception.is_none());
        assert!(report.unknown_streams.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].index, 1);
        assert_eq!(report.diagnostics[0].kind.name(), "TruncatedStream");
    }

    #[test]
    fn test_print_json() {
        let dump = SynthMinidump::new()
            .add_system_info(system_info(
                md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_ARM64,
            ))
            .add_stream(SimpleStream {
                stream_type: 0x4d7a_0099,
                section: Section::new().append_bytes(&[1, 2, 3]),
            })
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let mut out = Vec::new();
        report.print_json(&mut out, false).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["endian"], "little");
        assert_eq!(value["system_info"]["cpu_arch"], "arm64");
        assert_eq!(value["crash_info"], serde_json::Value::Null);
        assert_eq!(value["unknown_streams"][0]["vendor"], "Mozilla Extension");
        assert_eq!(value["unknown_streams"][0]["size"], 3);
        assert_eq!(value["diagnostics"], json!([]));
    }

    #[test]
    fn test_crashpad_info_in_report() {
        let module = ModuleCrashpadInfo::new(0, SynthEndian::Little)
            .add_list_annotation("first")
            .add_annotation_object("url", AnnotationValue::String("about:blank".to_owned()))
            .add_annotation_object("blob", AnnotationValue::Custom(0x8002, vec![1, 2]));
        let info = SynthCrashpadInfo::new(SynthEndian::Little)
            .add_simple_annotation("prod", "app")
            .add_module(module);
        let dump = SynthMinidump::new()
            .add_crashpad_info(info)
            // A second copy is a duplicate singleton.
            .add_crashpad_info(SynthCrashpadInfo::new(SynthEndian::Little))
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert_eq!(
            report.diagnostics.iter().map(|d| d.kind.clone()).collect::<Vec<_>>(),
            vec![DiagnosticKind::DuplicateSingletonStream { kept_index: 0 }]
        );
        assert_eq!(
            &*report.crashpad_info.as_ref().unwrap().simple_annotations["prod"],
            "app"
        );

        let mut out = Vec::new();
        report.print_json(&mut out, false).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let crashpad = &value["crashpad_info"];
        assert_eq!(crashpad["version"], 1);
        assert_eq!(crashpad["report_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(crashpad["simple_annotations"], json!({ "prod": "app" }));
        assert_eq!(crashpad["module_list"][0]["module_index"], 0);
        assert_eq!(crashpad["module_list"][0]["list_annotations"], json!(["first"]));
        assert_eq!(
            crashpad["module_list"][0]["annotation_objects"],
            json!({ "url": "about:blank", "blob": { "type": 0x8002 } })
        );

        let mut out = Vec::new();
        report.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("MDRawCrashpadInfo\n  version = 1\n"));
        assert!(text.contains("  simple_annotations[\"prod\"] = app\n"));
    }

    #[test]
    fn test_print_text() {
        let dump = SynthMinidump::new()
            .add_stream(SimpleStream {
                stream_type: 0x4767_0099,
                section: Section::new().append_bytes(&[0xde, 0xad]),
            })
            .add_raw_directory_entry(MINIDUMP_STREAM_TYPE::MiscInfoStream as u32, 24, 0xffff_ff00)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let mut out = Vec::new();
        report.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("MDRawHeader\n"));
        assert!(text.contains("Stream 0x47670099 (Google Extension), 2 bytes\n  dead\n"));
        assert!(text.contains("Diagnostics (1):\n  MiscInfoStream (directory entry 1): "));
    }
}
