// Copyright 2016 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Synthetic minidumps for tests.
//!
//! Start from a [`SynthMinidump`], add streams, records and out-of-band data to it, then
//! call `finish()` to lay everything out and resolve the offsets. The records are written
//! field by field with `test_assembler` rather than through `minidump-format`'s layouts,
//! so a mistake in one of those layouts shows up as a failing decode instead of a
//! self-consistent round trip.
//!
//! Besides well-formed dumps the builder can produce the damaged ones a salvaging decoder
//! has to survive: lists that declare more entries than they hold, directory entries that
//! point past the end of the file, strings with odd lengths.

// Some test_assembler types do not have Debug.
#![allow(missing_debug_implementations)]

use minidump_format::format as md;
use scroll::ctx::SizeWith;
use scroll::LE;
use std::marker::PhantomData;
use std::mem;
use test_assembler::*;

/// A writer of synthetic minidumps.
pub struct SynthMinidump {
    endian: Endian,
    /// Everything written so far, starting with the header.
    section: Section,
    /// Header fields that are only known once the dump is finished.
    version: Label,
    flags: Label,
    stream_count: u32,
    stream_count_label: Label,
    stream_directory_rva: Label,
    stream_directory: Section,
    module_list: ListStream<Module>,
    unloaded_module_list: ListStream<UnloadedModule>,
    thread_list: ListStream<Thread>,
    thread_names: ListStream<ThreadName>,
    memory_list: ListStream<Section>,
    memory64_list: Memory64ListStream,
    /// The bytes of every `Memory64List` range, back to back.
    memory64_data: Section,
    memory_info_list: ListStream<MemoryInfo>,
    /// Singleton streams, written after the lists in the order they were added.
    pending: Vec<SimpleStream>,
}

/// A block of data that ends up somewhere in the minidump.
pub trait DumpSection {
    /// Offset of this block from the start of the minidump.
    fn file_offset(&self) -> Label;

    /// Size of this block in bytes.
    fn file_size(&self) -> Label;
}

/// An entry of a [`List`], optionally with data that lives after the list itself.
///
/// Anything that converts into a `Section` is an entry without out-of-band data.
pub trait ListItem: DumpSection {
    /// The in-band record and the optional out-of-band data.
    fn into_sections(self) -> (Section, Option<Section>);
}

impl<T> ListItem for T
where
    T: Into<Section> + DumpSection,
{
    fn into_sections(self) -> (Section, Option<Section>) {
        (self.into(), None)
    }
}

pub trait CiteLocation {
    /// Append a `MINIDUMP_LOCATION_DESCRIPTOR` for `self` to `section`.
    fn cite_location_in(&self, section: Section) -> Section;
}

impl<T: DumpSection> CiteLocation for T {
    fn cite_location_in(&self, section: Section) -> Section {
        section.D32(self.file_size()).D32(self.file_offset())
    }
}

/// An explicit (size, offset) pair.
impl CiteLocation for (Label, Label) {
    fn cite_location_in(&self, section: Section) -> Section {
        section.D32(&self.0).D32(&self.1)
    }
}

/// A location that is not under test, e.g. a context blob pointing at nonsense.
impl CiteLocation for (u32, u32) {
    fn cite_location_in(&self, section: Section) -> Section {
        section.D32(self.0).D32(self.1)
    }
}

impl<T: CiteLocation> CiteLocation for Option<T> {
    fn cite_location_in(&self, section: Section) -> Section {
        match self {
            Some(inner) => inner.cite_location_in(section),
            None => section.D32(0).D32(0),
        }
    }
}

/// Chainable helpers for `Section`.
pub trait SectionExtra {
    fn cite_location<T: CiteLocation>(self, thing: &T) -> Self;
    fn cite_memory(self, memory: &Memory) -> Self;
}

impl SectionExtra for Section {
    fn cite_location<T: CiteLocation>(self, thing: &T) -> Self {
        thing.cite_location_in(self)
    }
    fn cite_memory(self, memory: &Memory) -> Self {
        memory.cite_memory_in(self)
    }
}

/// A stream with an entry in the directory.
pub trait Stream: DumpSection + Into<Section> {
    fn stream_type(&self) -> u32;

    /// Append a `MINIDUMP_DIRECTORY` entry for `self` to `section`.
    fn cite_stream_in(&self, section: Section) -> Section {
        section.D32(self.stream_type()).cite_location(self)
    }
}

impl SynthMinidump {
    pub fn new() -> SynthMinidump {
        SynthMinidump::with_endian(DEFAULT_ENDIAN)
    }

    pub fn with_endian(endian: Endian) -> SynthMinidump {
        let version = Label::new();
        let flags = Label::new();
        let stream_count_label = Label::new();
        let stream_directory_rva = Label::new();
        let section = Section::with_endian(endian)
            .D32(md::MINIDUMP_SIGNATURE)
            .D32(&version)
            .D32(&stream_count_label)
            .D32(&stream_directory_rva)
            .D32(0) // checksum
            .D32(1262805309) // time_date_stamp
            .D64(&flags);
        section.start().set_const(0);
        assert_eq!(section.size(), md::MINIDUMP_HEADER::size_with(&LE) as u64);

        let memory64_data = Section::with_endian(endian);
        SynthMinidump {
            endian,
            section,
            version,
            flags,
            stream_count: 0,
            stream_count_label,
            stream_directory_rva,
            stream_directory: Section::with_endian(endian),
            module_list: ListStream::new(md::MINIDUMP_STREAM_TYPE::ModuleListStream, endian),
            unloaded_module_list: ListStream::extended(
                md::MINIDUMP_STREAM_TYPE::UnloadedModuleListStream,
                md::MINIDUMP_UNLOADED_MODULE::size_with(&LE),
                endian,
            ),
            thread_list: ListStream::new(md::MINIDUMP_STREAM_TYPE::ThreadListStream, endian),
            thread_names: ListStream::new(md::MINIDUMP_STREAM_TYPE::ThreadNamesStream, endian),
            memory_list: ListStream::new(md::MINIDUMP_STREAM_TYPE::MemoryListStream, endian),
            memory64_list: Memory64ListStream::new(endian, &memory64_data.file_offset()),
            memory64_data,
            memory_info_list: ListStream::extended(
                md::MINIDUMP_STREAM_TYPE::MemoryInfoListStream,
                md::MINIDUMP_MEMORY_INFO::size_with(&LE),
                endian,
            ),
            pending: Vec::new(),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Set the header flags.
    pub fn flags(self, flags: u64) -> SynthMinidump {
        self.flags.set_const(flags);
        self
    }

    /// Set the header version word, [`md::MINIDUMP_VERSION`] by default.
    pub fn version(self, version: u32) -> SynthMinidump {
        self.version.set_const(version as u64);
        self
    }

    /// Append `section` to the dump and resolve its offset.
    #[allow(clippy::should_implement_trait)]
    pub fn add<T>(mut self, section: T) -> SynthMinidump
    where
        T: DumpSection + Into<Section>,
    {
        let offset = section.file_offset();
        self.section = self.section.mark(&offset).append_section(section);
        self
    }

    pub fn add_module(mut self, module: Module) -> SynthMinidump {
        self.module_list = self.module_list.add(module);
        self
    }

    pub fn add_unloaded_module(mut self, module: UnloadedModule) -> SynthMinidump {
        self.unloaded_module_list = self.unloaded_module_list.add(module);
        self
    }

    pub fn add_thread(mut self, thread: Thread) -> SynthMinidump {
        self.thread_list = self.thread_list.add(thread);
        self
    }

    pub fn add_thread_name(mut self, name: ThreadName) -> SynthMinidump {
        self.thread_names = self.thread_names.add(name);
        self
    }

    /// Add `memory` to the dump and describe it in the `MemoryListStream`.
    pub fn add_memory(mut self, memory: Memory) -> SynthMinidump {
        let descriptor = memory.cite_memory_in(Section::with_endian(self.endian));
        self.memory_list = self.memory_list.add(descriptor);
        self.add(memory)
    }

    /// Add `memory` to the contiguous block described by the `Memory64ListStream`.
    pub fn add_memory64(mut self, memory: Memory) -> SynthMinidump {
        self.memory64_list = self.memory64_list.add_memory(&memory);
        self.memory64_data = self.memory64_data.append_section(memory.section);
        self
    }

    pub fn add_memory_info(mut self, info: MemoryInfo) -> SynthMinidump {
        self.memory_info_list = self.memory_info_list.add(info);
        self
    }

    pub fn add_system_info(self, system_info: SystemInfo) -> SynthMinidump {
        self.queue(system_info)
    }

    pub fn add_exception(self, exception: Exception) -> SynthMinidump {
        self.queue(exception)
    }

    pub fn add_misc_info(self, misc: MiscStream) -> SynthMinidump {
        self.queue(misc)
    }

    pub fn add_breakpad_info(self, info: BreakpadInfo) -> SynthMinidump {
        self.queue(info)
    }

    pub fn add_assertion_info(self, info: AssertionInfo) -> SynthMinidump {
        self.queue(info)
    }

    /// Queue Crashpad's annotation stream.
    pub fn add_crashpad_info(self, info: CrashpadInfo) -> SynthMinidump {
        self.queue(info)
    }

    /// Queue one of Breakpad's `/proc` text streams, e.g. [`md::MINIDUMP_STREAM_TYPE::LinuxMaps`].
    pub fn add_linux_stream(self, stream_type: md::MINIDUMP_STREAM_TYPE, contents: &[u8]) -> Self {
        let stream = SimpleStream {
            stream_type: stream_type.into(),
            section: Section::new().append_bytes(contents),
        };
        self.queue(stream)
    }

    fn queue<T: Stream>(mut self, stream: T) -> SynthMinidump {
        self.pending.push(SimpleStream {
            stream_type: stream.stream_type(),
            section: stream.into(),
        });
        self
    }

    /// Append `stream` right away and cite it in the directory.
    pub fn add_stream<T: Stream>(mut self, stream: T) -> SynthMinidump {
        self.stream_directory = stream.cite_stream_in(self.stream_directory);
        self.stream_count += 1;
        self.add(stream)
    }

    /// Add a directory entry with an arbitrary location and no payload behind it.
    pub fn add_raw_directory_entry(mut self, stream_type: u32, data_size: u32, rva: u32) -> Self {
        self.stream_directory = self
            .stream_directory
            .D32(stream_type)
            .D32(data_size)
            .D32(rva);
        self.stream_count += 1;
        self
    }

    fn add_list<T: ListItem>(self, list: ListStream<T>) -> SynthMinidump {
        if list.is_empty() {
            self
        } else {
            self.add_stream(list)
        }
    }

    /// Lay out all queued streams and the directory, and return the bytes.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        let endian = self.endian;
        let modules = mem::replace(&mut self.module_list, ListStream::new(0u32, endian));
        self = self.add_list(modules);
        let unloaded = mem::replace(&mut self.unloaded_module_list, ListStream::new(0u32, endian));
        self = self.add_list(unloaded);
        let memory = mem::replace(&mut self.memory_list, ListStream::new(0u32, endian));
        self = self.add_list(memory);
        let memory64 = mem::replace(
            &mut self.memory64_list,
            Memory64ListStream::new(endian, &Label::new()),
        );
        if !memory64.is_empty() {
            self = self.add_stream(memory64);
        }
        let memory_info = mem::replace(&mut self.memory_info_list, ListStream::new(0u32, endian));
        self = self.add_list(memory_info);
        let threads = mem::replace(&mut self.thread_list, ListStream::new(0u32, endian));
        self = self.add_list(threads);
        let names = mem::replace(&mut self.thread_names, ListStream::new(0u32, endian));
        self = self.add_list(names);
        for stream in mem::take(&mut self.pending) {
            self = self.add_stream(stream);
        }
        let memory64_data = mem::replace(&mut self.memory64_data, Section::new());
        self = self.add(memory64_data);

        let SynthMinidump {
            section,
            version,
            flags,
            stream_count,
            stream_count_label,
            stream_directory_rva,
            stream_directory,
            ..
        } = self;
        if version.value().is_none() {
            version.set_const(md::MINIDUMP_VERSION as u64);
        }
        if flags.value().is_none() {
            flags.set_const(0);
        }
        stream_count_label.set_const(stream_count as u64);
        section
            .mark(&stream_directory_rva)
            .append_section(stream_directory)
            .get_contents()
    }
}

impl Default for SynthMinidump {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpSection for Section {
    fn file_offset(&self) -> Label {
        self.start()
    }

    fn file_size(&self) -> Label {
        self.final_size()
    }
}

macro_rules! impl_dumpsection {
    ( $x:ty ) => {
        impl DumpSection for $x {
            fn file_offset(&self) -> Label {
                self.section.file_offset()
            }
            fn file_size(&self) -> Label {
                self.section.file_size()
            }
        }
    };
}

/// A stream whose payload is built by hand.
pub struct SimpleStream {
    pub stream_type: u32,
    pub section: Section,
}

impl From<SimpleStream> for Section {
    fn from(stream: SimpleStream) -> Self {
        stream.section
    }
}

impl_dumpsection!(SimpleStream);

impl Stream for SimpleStream {
    fn stream_type(&self) -> u32 {
        self.stream_type
    }
}

/// A counted list of records followed by their out-of-band data.
///
/// Two header styles exist: a bare u32 count (module, thread and memory lists) and the
/// extended `size_of_header, size_of_entry, number_of_entries` triple (unloaded modules,
/// memory info).
pub struct List<T: ListItem> {
    section: Section,
    count: u32,
    count_label: Label,
    /// Overrides the count written to the header.
    declared_count: Option<u32>,
    out_of_band: Section,
    _type: PhantomData<T>,
}

impl<T: ListItem> List<T> {
    pub fn new(endian: Endian) -> Self {
        let count_label = Label::new();
        let section = Section::with_endian(endian).D32(&count_label);
        Self::with_header(section, count_label, endian)
    }

    /// A list with the extended header and entries of `size_of_entry` bytes.
    pub fn extended(size_of_entry: usize, endian: Endian) -> Self {
        let count_label = Label::new();
        let section = Section::with_endian(endian)
            .D32(12)
            .D32(size_of_entry as u32)
            .D32(&count_label);
        Self::with_header(section, count_label, endian)
    }

    fn with_header(section: Section, count_label: Label, endian: Endian) -> Self {
        List {
            section,
            count: 0,
            count_label,
            declared_count: None,
            out_of_band: Section::with_endian(endian),
            _type: PhantomData,
        }
    }

    /// Write `count` into the header instead of the number of entries actually added.
    pub fn declare_count(mut self, count: u32) -> Self {
        self.declared_count = Some(count);
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, entry: T) -> Self {
        self.count += 1;
        let (section, out_of_band) = entry.into_sections();
        self.section = self
            .section
            .mark(&section.file_offset())
            .append_section(section);
        if let Some(out_of_band) = out_of_band {
            self.out_of_band = self
                .out_of_band
                .mark(&out_of_band.file_offset())
                .append_section(out_of_band);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<T: ListItem> From<List<T>> for Section {
    fn from(list: List<T>) -> Self {
        let count = list.declared_count.unwrap_or(list.count);
        list.count_label.set_const(count as u64);
        list.section
            .mark(&list.out_of_band.file_offset())
            .append_section(list.out_of_band)
    }
}

impl<T: ListItem> DumpSection for List<T> {
    fn file_offset(&self) -> Label {
        self.section.file_offset()
    }

    fn file_size(&self) -> Label {
        self.section.file_size()
    }
}

/// A [`List`] with a stream type.
pub struct ListStream<T: ListItem> {
    stream_type: u32,
    list: List<T>,
}

impl<T: ListItem> ListStream<T> {
    pub fn new<S: Into<u32>>(stream_type: S, endian: Endian) -> Self {
        Self {
            stream_type: stream_type.into(),
            list: List::new(endian),
        }
    }

    pub fn extended<S: Into<u32>>(stream_type: S, size_of_entry: usize, endian: Endian) -> Self {
        Self {
            stream_type: stream_type.into(),
            list: List::extended(size_of_entry, endian),
        }
    }

    pub fn declare_count(mut self, count: u32) -> Self {
        self.list = self.list.declare_count(count);
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, entry: T) -> Self {
        self.list = self.list.add(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<T: ListItem> From<ListStream<T>> for Section {
    fn from(stream: ListStream<T>) -> Self {
        stream.list.into()
    }
}

impl<T: ListItem> DumpSection for ListStream<T> {
    fn file_offset(&self) -> Label {
        self.list.file_offset()
    }

    fn file_size(&self) -> Label {
        self.list.file_size()
    }
}

impl<T: ListItem> Stream for ListStream<T> {
    fn stream_type(&self) -> u32 {
        self.stream_type
    }
}

/// `MINIDUMP_MEMORY64_LIST`: descriptors without RVAs plus one base offset.
pub struct Memory64ListStream {
    section: Section,
    count: u64,
    count_label: Label,
}

impl Memory64ListStream {
    pub fn new(endian: Endian, base_rva: &Label) -> Self {
        let count_label = Label::new();
        let section = Section::with_endian(endian).D64(&count_label).D64(base_rva);
        Self {
            section,
            count: 0,
            count_label,
        }
    }

    pub fn add_memory(mut self, memory: &Memory) -> Self {
        self.count += 1;
        self.section = self.section.D64(memory.address).D64(memory.section.size());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl From<Memory64ListStream> for Section {
    fn from(list: Memory64ListStream) -> Self {
        list.count_label.set_const(list.count);
        list.section
    }
}

impl_dumpsection!(Memory64ListStream);

impl Stream for Memory64ListStream {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::Memory64ListStream.into()
    }
}

/// A `MINIDUMP_STRING`: byte length, then UTF-16 in the dump's byte order.
pub struct DumpString {
    section: Section,
}

impl DumpString {
    pub fn new(s: &str, endian: Endian) -> DumpString {
        let mut bytes = Vec::with_capacity(s.len() * 2);
        for unit in s.encode_utf16() {
            match endian {
                Endian::Little => bytes.extend_from_slice(&unit.to_le_bytes()),
                Endian::Big => bytes.extend_from_slice(&unit.to_be_bytes()),
            }
        }
        Self::with_length(bytes.len() as u32, &bytes, endian)
    }

    /// A string whose length prefix need not agree with its payload.
    pub fn with_length(length: u32, payload: &[u8], endian: Endian) -> DumpString {
        let section = Section::with_endian(endian)
            .D32(length)
            .append_bytes(payload);
        DumpString { section }
    }
}

impl From<DumpString> for Section {
    fn from(string: DumpString) -> Self {
        string.section
    }
}

impl_dumpsection!(DumpString);

/// Version info used by [`Module::new`] when none is given.
pub const STOCK_VERSION_INFO: md::VS_FIXEDFILEINFO = md::VS_FIXEDFILEINFO {
    signature: md::VS_FFI_SIGNATURE,
    struct_version: md::VS_FFI_STRUCVERSION,
    file_version_hi: 0x11111111,
    file_version_lo: 0x22222222,
    product_version_hi: 0x33333333,
    product_version_lo: 0x44444444,
    file_flags_mask: 1,
    file_flags: 1,
    file_os: 0x40004,
    file_type: 1,
    file_subtype: 0,
    file_date_hi: 0,
    file_date_lo: 0,
};

/// A `MINIDUMP_MODULE`.
pub struct Module {
    section: Section,
    cv_record: Option<(Label, Label)>,
    misc_record: Option<(Label, Label)>,
}

impl Module {
    pub fn new<'a, T: Into<Option<&'a md::VS_FIXEDFILEINFO>>>(
        endian: Endian,
        base_of_image: u64,
        size_of_image: u32,
        name: &DumpString,
        time_date_stamp: u32,
        checksum: u32,
        version_info: T,
    ) -> Module {
        let info = version_info.into().unwrap_or(&STOCK_VERSION_INFO);
        let mut section = Section::with_endian(endian)
            .D64(base_of_image)
            .D32(size_of_image)
            .D32(checksum)
            .D32(time_date_stamp)
            .D32(name.file_offset());
        for word in [
            info.signature,
            info.struct_version,
            info.file_version_hi,
            info.file_version_lo,
            info.product_version_hi,
            info.product_version_lo,
            info.file_flags_mask,
            info.file_flags,
            info.file_os,
            info.file_type,
            info.file_subtype,
            info.file_date_hi,
            info.file_date_lo,
        ] {
            section = section.D32(word);
        }
        Module {
            section,
            cv_record: None,
            misc_record: None,
        }
    }

    pub fn cv_record<T: DumpSection>(mut self, cv_record: &T) -> Module {
        self.cv_record = Some((cv_record.file_size(), cv_record.file_offset()));
        self
    }

    pub fn misc_record<T: DumpSection>(mut self, misc_record: &T) -> Module {
        self.misc_record = Some((misc_record.file_size(), misc_record.file_offset()));
        self
    }
}

impl_dumpsection!(Module);

impl From<Module> for Section {
    fn from(module: Module) -> Self {
        module
            .section
            .cite_location(&module.cv_record)
            .cite_location(&module.misc_record)
            .D64(0) // reserved0
            .D64(0) // reserved1
    }
}

/// A `CV_INFO_PDB70` record.
pub fn cv_pdb70(endian: Endian, guid: md::GUID, age: u32, pdb_file_name: &str) -> Section {
    Section::with_endian(endian)
        .D32(md::CvSignature::Pdb70 as u32)
        .append_section(Guid::new(guid, endian))
        .D32(age)
        .append_bytes(pdb_file_name.as_bytes())
        .D8(0)
}

/// A `CV_INFO_PDB20` record.
pub fn cv_pdb20(endian: Endian, signature: u32, age: u32, pdb_file_name: &str) -> Section {
    Section::with_endian(endian)
        .D32(md::CvSignature::Pdb20 as u32)
        .D32(0) // cv_offset
        .D32(signature)
        .D32(age)
        .append_bytes(pdb_file_name.as_bytes())
        .D8(0)
}

/// Breakpad's ELF build id record.
pub fn cv_elf(endian: Endian, build_id: &[u8]) -> Section {
    Section::with_endian(endian)
        .D32(md::CvSignature::Elf as u32)
        .append_bytes(build_id)
}

/// A `MINIDUMP_UNLOADED_MODULE`.
pub struct UnloadedModule {
    section: Section,
}

impl UnloadedModule {
    pub fn new(
        endian: Endian,
        base_of_image: u64,
        size_of_image: u32,
        name: &DumpString,
        time_date_stamp: u32,
        checksum: u32,
    ) -> UnloadedModule {
        let section = Section::with_endian(endian)
            .D64(base_of_image)
            .D32(size_of_image)
            .D32(checksum)
            .D32(time_date_stamp)
            .D32(name.file_offset());
        UnloadedModule { section }
    }
}

impl_dumpsection!(UnloadedModule);

impl From<UnloadedModule> for Section {
    fn from(module: UnloadedModule) -> Self {
        module.section
    }
}

/// A `MINIDUMP_THREAD`.
pub struct Thread {
    section: Section,
}

impl Thread {
    pub fn new<T: CiteLocation>(endian: Endian, id: u32, stack: &Memory, context: &T) -> Thread {
        Self::with_details(endian, id, 0, 0, 0, stack, context)
    }

    pub fn with_details<T: CiteLocation>(
        endian: Endian,
        id: u32,
        suspend_count: u32,
        priority: u32,
        teb: u64,
        stack: &Memory,
        context: &T,
    ) -> Thread {
        let section = Section::with_endian(endian)
            .D32(id)
            .D32(suspend_count)
            .D32(0) // priority_class
            .D32(priority)
            .D64(teb)
            .cite_memory(stack)
            .cite_location(context);
        Thread { section }
    }
}

impl_dumpsection!(Thread);

impl From<Thread> for Section {
    fn from(thread: Thread) -> Self {
        thread.section
    }
}

/// A `MINIDUMP_THREAD_NAME`. `None` writes an RVA that points nowhere.
pub struct ThreadName {
    section: Section,
}

impl ThreadName {
    pub fn new(endian: Endian, id: u32, name: Option<&DumpString>) -> Self {
        let section = Section::with_endian(endian).D32(id);
        let section = match name {
            Some(name) => section.D64(name.file_offset()),
            None => section.D64(0xFFFF_FFFF_FFFF_FFFF),
        };
        ThreadName { section }
    }
}

impl_dumpsection!(ThreadName);

impl From<ThreadName> for Section {
    fn from(name: ThreadName) -> Self {
        name.section
    }
}

/// Bytes captured from `address` in the crashed process.
pub struct Memory {
    section: Section,
    pub address: u64,
}

impl Memory {
    pub fn with_section(section: Section, address: u64) -> Memory {
        Memory { section, address }
    }

    /// Append a `MINIDUMP_MEMORY_DESCRIPTOR` for this range to `section`.
    pub fn cite_memory_in(&self, section: Section) -> Section {
        section.D64(self.address).cite_location(self)
    }
}

impl_dumpsection!(Memory);

impl From<Memory> for Section {
    fn from(memory: Memory) -> Self {
        memory.section
    }
}

/// A `MINIDUMP_MEMORY_INFO`.
pub struct MemoryInfo {
    section: Section,
}

impl MemoryInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endian: Endian,
        base_address: u64,
        allocation_base: u64,
        allocation_protection: u32,
        region_size: u64,
        state: u32,
        protection: u32,
        ty: u32,
    ) -> MemoryInfo {
        let section = Section::with_endian(endian)
            .D64(base_address)
            .D64(allocation_base)
            .D32(allocation_protection)
            .D32(0)
            .D64(region_size)
            .D32(state)
            .D32(protection)
            .D32(ty)
            .D32(0);
        MemoryInfo { section }
    }
}

impl_dumpsection!(MemoryInfo);

impl From<MemoryInfo> for Section {
    fn from(info: MemoryInfo) -> Self {
        info.section
    }
}

/// A `MINIDUMP_MISC_INFO` or `MINIDUMP_MISC_INFO_2`, depending on whether power info is set.
///
/// `flags1` is derived from which fields are present.
pub struct MiscStream {
    section: Section,
    pub process_id: Option<u32>,
    /// (create, user, kernel)
    pub process_times: Option<(u32, u32, u32)>,
    /// (max mhz, current mhz, mhz limit, max idle state, current idle state)
    pub power_info: Option<[u32; 5]>,
}

impl MiscStream {
    pub fn new(endian: Endian) -> MiscStream {
        MiscStream {
            section: Section::with_endian(endian),
            process_id: None,
            process_times: None,
            power_info: None,
        }
    }
}

impl From<MiscStream> for Section {
    fn from(stream: MiscStream) -> Self {
        let mut flags = md::MiscInfoFlags::empty();
        if stream.process_id.is_some() {
            flags |= md::MiscInfoFlags::MINIDUMP_MISC1_PROCESS_ID;
        }
        if stream.process_times.is_some() {
            flags |= md::MiscInfoFlags::MINIDUMP_MISC1_PROCESS_TIMES;
        }
        if stream.power_info.is_some() {
            flags |= md::MiscInfoFlags::MINIDUMP_MISC1_PROCESSOR_POWER_INFO;
        }
        let size = if stream.power_info.is_some() {
            md::MINIDUMP_MISC_INFO2::size_with(&LE)
        } else {
            md::MINIDUMP_MISC_INFO::size_with(&LE)
        };
        let (create, user, kernel) = stream.process_times.unwrap_or_default();
        let mut section = stream
            .section
            .D32(size as u32)
            .D32(flags.bits())
            .D32(stream.process_id.unwrap_or_default())
            .D32(create)
            .D32(user)
            .D32(kernel);
        if let Some(power) = stream.power_info {
            for value in power {
                section = section.D32(value);
            }
        }
        section
    }
}

impl_dumpsection!(MiscStream);

impl Stream for MiscStream {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::MiscInfoStream.into()
    }
}

/// A `CONTEXT_X86` with everything but `eip` and `esp` zeroed.
pub fn x86_context(endian: Endian, eip: u32, esp: u32) -> Section {
    let section = Section::with_endian(endian)
        .D32(0x1007f) // CONTEXT_X86 | all
        .append_repeated(0, 4 * 6) // debug registers
        .append_repeated(0, md::FLOATING_SAVE_AREA_X86::size_with(&LE))
        .append_repeated(0, 4 * 11) // gs through ebp
        .D32(eip)
        .D32(0) // cs
        .D32(0) // eflags
        .D32(esp)
        .D32(0) // ss
        .append_repeated(0, 512);
    assert_eq!(section.size(), md::CONTEXT_X86::size_with(&LE) as u64);
    section
}

/// A `CONTEXT_AMD64` with everything but `rip` and `rsp` zeroed.
pub fn amd64_context(endian: Endian, rip: u64, rsp: u64) -> Section {
    let section = Section::with_endian(endian)
        .append_repeated(0, 8 * 6) // home addresses
        .D32(0x10001f) // CONTEXT_AMD64 | all
        .D32(0) // mx_csr
        .append_repeated(0, 2 * 6) // segment selectors
        .D32(0) // eflags
        .append_repeated(0, 8 * 6) // debug registers
        .append_repeated(0, 8 * 4) // rax, rcx, rdx, rbx
        .D64(rsp)
        .append_repeated(0, 8 * 11) // rbp through r15
        .D64(rip)
        .append_repeated(0, 512) // float_save
        .append_repeated(0, 16 * 26) // vector_register
        .append_repeated(0, 8 * 6); // vector/debug control, branch records
    assert_eq!(section.size(), md::CONTEXT_AMD64::size_with(&LE) as u64);
    section
}

/// A Breakpad `CONTEXT_ARM` with everything but pc and sp zeroed.
pub fn arm_context(endian: Endian, pc: u32, sp: u32) -> Section {
    let mut section = Section::with_endian(endian).D32(0x40000002); // CONTEXT_ARM | integer
    for reg in 0..16 {
        section = match reg {
            13 => section.D32(sp),
            15 => section.D32(pc),
            _ => section.D32(0),
        };
    }
    let section = section
        .D32(0) // cpsr
        .append_repeated(0, md::FLOATING_SAVE_AREA_ARM::size_with(&LE));
    assert_eq!(section.size(), md::CONTEXT_ARM::size_with(&LE) as u64);
    section
}

/// A Breakpad `CONTEXT_ARM64` with everything but pc and sp zeroed.
pub fn arm64_context(endian: Endian, pc: u64, sp: u64) -> Section {
    let section = Section::with_endian(endian)
        .D32(0x400002) // CONTEXT_ARM64 | integer
        .D32(0) // cpsr
        .append_repeated(0, 8 * 31) // x0 through lr
        .D64(sp)
        .D64(pc)
        .append_repeated(0, md::FLOATING_SAVE_AREA_ARM64::size_with(&LE))
        .append_repeated(0, 4 * 8 + 8 * 8 + 4 * 2 + 8 * 2); // debug registers
    assert_eq!(section.size(), md::CONTEXT_ARM64::size_with(&LE) as u64);
    section
}

/// Writes a `GUID` in the dump's byte order.
pub struct Guid {
    section: Section,
}

impl Guid {
    pub fn new(guid: md::GUID, endian: Endian) -> Self {
        let section = Section::with_endian(endian)
            .D32(guid.data1)
            .D16(guid.data2)
            .D16(guid.data3)
            .append_bytes(&guid.data4);
        Self { section }
    }
}

impl From<Guid> for Section {
    fn from(guid: Guid) -> Self {
        guid.section
    }
}

/// A `MINIDUMP_UTF8_STRING`: byte length, the bytes, then a NUL.
pub struct DumpUtf8String {
    section: Section,
}

impl DumpUtf8String {
    pub fn new(s: &str, endian: Endian) -> Self {
        let section = Section::with_endian(endian)
            .D32(s.len() as u32)
            .append_bytes(s.as_bytes())
            .D8(0);
        Self { section }
    }
}

impl From<DumpUtf8String> for Section {
    fn from(string: DumpUtf8String) -> Self {
        string.section
    }
}

impl_dumpsection!(DumpUtf8String);

/// A list entry that is just the RVA of its out-of-band data.
pub struct SectionRef {
    section: Section,
    data_section: Section,
}

impl SectionRef {
    pub fn new(data_section: impl Into<Section>, endian: Endian) -> Self {
        let data_section = data_section.into();
        let section = Section::with_endian(endian).D32(data_section.file_offset());
        Self {
            section,
            data_section,
        }
    }
}

impl_dumpsection!(SectionRef);

impl ListItem for SectionRef {
    fn into_sections(self) -> (Section, Option<Section>) {
        (self.section, Some(self.data_section))
    }
}

pub struct SimpleStringDictionaryEntry {
    endian: Endian,
    section: Section,
    key: DumpUtf8String,
    value: DumpUtf8String,
}

impl SimpleStringDictionaryEntry {
    pub fn new(key: &str, value: &str, endian: Endian) -> Self {
        Self {
            endian,
            section: Section::with_endian(endian),
            key: DumpUtf8String::new(key, endian),
            value: DumpUtf8String::new(value, endian),
        }
    }
}

impl_dumpsection!(SimpleStringDictionaryEntry);

impl ListItem for SimpleStringDictionaryEntry {
    fn into_sections(self) -> (Section, Option<Section>) {
        let section = self
            .section
            .D32(self.key.file_offset())
            .D32(self.value.file_offset());
        let out_of_band = Section::with_endian(self.endian)
            .mark(&self.key.file_offset())
            .append_section(self.key)
            .mark(&self.value.file_offset())
            .append_section(self.value);
        (section, Some(out_of_band))
    }
}

pub type SimpleStringDictionary = List<SimpleStringDictionaryEntry>;

#[derive(Clone, Debug)]
pub enum AnnotationValue {
    Invalid,
    String(String),
    /// An application type code and its raw bytes.
    Custom(u16, Vec<u8>),
}

pub struct AnnotationObject {
    section: Section,
    out_of_band: Section,
}

impl AnnotationObject {
    pub fn new(name: &str, value: AnnotationValue, endian: Endian) -> Self {
        let name = DumpUtf8String::new(name, endian);
        let (ty, value) = match value {
            AnnotationValue::Invalid => (md::MINIDUMP_ANNOTATION::TYPE_INVALID, None),
            // The value is length-prefixed but not NUL terminated.
            AnnotationValue::String(s) => (
                md::MINIDUMP_ANNOTATION::TYPE_STRING,
                Some(
                    Section::with_endian(endian)
                        .D32(s.len() as u32)
                        .append_bytes(s.as_bytes()),
                ),
            ),
            AnnotationValue::Custom(ty, bytes) => (
                ty,
                Some(
                    Section::with_endian(endian)
                        .D32(bytes.len() as u32)
                        .append_bytes(&bytes),
                ),
            ),
        };

        let section = Section::with_endian(endian)
            .D32(name.file_offset())
            .D16(ty)
            .D16(0);
        let section = match value {
            Some(ref value) => section.D32(value.file_offset()),
            None => section.D32(0),
        };

        let mut out_of_band = Section::with_endian(endian)
            .mark(&name.file_offset())
            .append_section(name);
        if let Some(value) = value {
            out_of_band = out_of_band.mark(&value.file_offset()).append_section(value);
        }
        Self {
            section,
            out_of_band,
        }
    }
}

impl_dumpsection!(AnnotationObject);

impl ListItem for AnnotationObject {
    fn into_sections(self) -> (Section, Option<Section>) {
        (self.section, Some(self.out_of_band))
    }
}

pub type AnnotationObjects = List<AnnotationObject>;

/// A `MINIDUMP_MODULE_CRASHPAD_INFO_LINK` and the record it cites.
pub struct ModuleCrashpadInfo {
    endian: Endian,
    section: Section,
    list_annotations: List<SectionRef>,
    simple_annotations: SimpleStringDictionary,
    annotation_objects: AnnotationObjects,
}

impl ModuleCrashpadInfo {
    /// `index` is the position of the module in the module list.
    pub fn new(index: u32, endian: Endian) -> Self {
        Self {
            endian,
            section: Section::with_endian(endian).D32(index),
            list_annotations: List::new(endian),
            simple_annotations: SimpleStringDictionary::new(endian),
            annotation_objects: AnnotationObjects::new(endian),
        }
    }

    pub fn add_list_annotation(mut self, value: &str) -> Self {
        let section = SectionRef::new(DumpUtf8String::new(value, self.endian), self.endian);
        self.list_annotations = self.list_annotations.add(section);
        self
    }

    pub fn add_simple_annotation(mut self, key: &str, value: &str) -> Self {
        let entry = SimpleStringDictionaryEntry::new(key, value, self.endian);
        self.simple_annotations = self.simple_annotations.add(entry);
        self
    }

    pub fn add_annotation_object(mut self, key: &str, value: AnnotationValue) -> Self {
        let object = AnnotationObject::new(key, value, self.endian);
        self.annotation_objects = self.annotation_objects.add(object);
        self
    }
}

impl_dumpsection!(ModuleCrashpadInfo);

impl ListItem for ModuleCrashpadInfo {
    fn into_sections(self) -> (Section, Option<Section>) {
        let info = Section::with_endian(self.endian)
            .D32(md::MINIDUMP_MODULE_CRASHPAD_INFO::VERSION)
            .cite_location(&self.list_annotations)
            .cite_location(&self.simple_annotations)
            .cite_location(&self.annotation_objects)
            .mark(&self.list_annotations.file_offset())
            .append_section(self.list_annotations)
            .mark(&self.simple_annotations.file_offset())
            .append_section(self.simple_annotations)
            .mark(&self.annotation_objects.file_offset())
            .append_section(self.annotation_objects);
        let link = self.section.cite_location(&info);
        (link, Some(info))
    }
}

pub type ModuleCrashpadInfoList = List<ModuleCrashpadInfo>;

/// The `CrashpadInfoStream`.
pub struct CrashpadInfo {
    endian: Endian,
    section: Section,
    version: u32,
    report_id: md::GUID,
    client_id: md::GUID,
    simple_annotations: SimpleStringDictionary,
    module_list: ModuleCrashpadInfoList,
}

impl CrashpadInfo {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            section: Section::with_endian(endian),
            version: md::MINIDUMP_CRASHPAD_INFO::VERSION,
            report_id: md::GUID::default(),
            client_id: md::GUID::default(),
            simple_annotations: SimpleStringDictionary::new(endian),
            module_list: ModuleCrashpadInfoList::new(endian),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn report_id(mut self, report_id: md::GUID) -> Self {
        self.report_id = report_id;
        self
    }

    pub fn client_id(mut self, client_id: md::GUID) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn add_simple_annotation(mut self, key: &str, value: &str) -> Self {
        let entry = SimpleStringDictionaryEntry::new(key, value, self.endian);
        self.simple_annotations = self.simple_annotations.add(entry);
        self
    }

    pub fn add_module(mut self, info: ModuleCrashpadInfo) -> Self {
        self.module_list = self.module_list.add(info);
        self
    }
}

impl_dumpsection!(CrashpadInfo);

impl From<CrashpadInfo> for Section {
    fn from(info: CrashpadInfo) -> Self {
        info.section
            .D32(info.version)
            .append_section(Guid::new(info.report_id, info.endian))
            .append_section(Guid::new(info.client_id, info.endian))
            .cite_location(&info.simple_annotations)
            .cite_location(&info.module_list)
            .mark(&info.simple_annotations.file_offset())
            .append_section(info.simple_annotations)
            .mark(&info.module_list.file_offset())
            .append_section(info.module_list)
    }
}

impl Stream for CrashpadInfo {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::CrashpadInfoStream.into()
    }
}

/// The `MINIDUMP_SYSTEM_INFO` stream. Only x86-style CPU info is written.
pub struct SystemInfo {
    section: Section,
    pub processor_architecture: u16,
    pub processor_level: u16,
    pub processor_revision: u16,
    pub number_of_processors: u8,
    pub product_type: u8,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    pub platform_id: u32,
    /// Service pack string, cited through `csd_version_rva`.
    pub csd_version: Option<Label>,
    pub suite_mask: u16,
    pub vendor_id: [u32; 3],
    pub version_information: u32,
    pub feature_information: u32,
    pub amd_extended_cpu_features: u32,
}

impl SystemInfo {
    pub fn new(endian: Endian) -> Self {
        Self {
            section: Section::with_endian(endian),
            processor_architecture: md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_INTEL as u16,
            processor_level: 6,
            processor_revision: 0,
            number_of_processors: 1,
            product_type: 0,
            major_version: 0,
            minor_version: 0,
            build_number: 0,
            platform_id: 0,
            csd_version: None,
            suite_mask: 0,
            vendor_id: [0; 3],
            version_information: 0,
            feature_information: 0,
            amd_extended_cpu_features: 0,
        }
    }

    pub fn set_processor_architecture(mut self, arch: u16) -> Self {
        self.processor_architecture = arch;
        self
    }

    pub fn set_platform_id(mut self, platform_id: u32) -> Self {
        self.platform_id = platform_id;
        self
    }

    pub fn set_csd_version(mut self, csd_version: &DumpString) -> Self {
        self.csd_version = Some(csd_version.file_offset());
        self
    }

    /// Set the `cpuid` vendor string, which must be 12 bytes.
    pub fn set_vendor(mut self, vendor: &[u8; 12]) -> Self {
        for (word, chunk) in self.vendor_id.iter_mut().zip(vendor.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        self
    }
}

impl_dumpsection!(SystemInfo);

impl From<SystemInfo> for Section {
    fn from(info: SystemInfo) -> Self {
        let section = info
            .section
            .D16(info.processor_architecture)
            .D16(info.processor_level)
            .D16(info.processor_revision)
            .D8(info.number_of_processors)
            .D8(info.product_type)
            .D32(info.major_version)
            .D32(info.minor_version)
            .D32(info.build_number)
            .D32(info.platform_id);
        let section = match info.csd_version {
            Some(ref rva) => section.D32(rva),
            None => section.D32(0),
        };
        section
            .D16(info.suite_mask)
            .D16(0) // reserved2
            .D32(info.vendor_id[0])
            .D32(info.vendor_id[1])
            .D32(info.vendor_id[2])
            .D32(info.version_information)
            .D32(info.feature_information)
            .D32(info.amd_extended_cpu_features)
    }
}

impl Stream for SystemInfo {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::SystemInfoStream.into()
    }
}

/// The `MINIDUMP_EXCEPTION_STREAM`.
pub struct Exception {
    section: Section,
    pub thread_id: u32,
    pub exception_code: u32,
    pub exception_flags: u32,
    pub exception_address: u64,
    pub parameters: Vec<u64>,
    pub thread_context: Option<(Label, Label)>,
}

impl Exception {
    pub fn new(endian: Endian) -> Self {
        Self {
            section: Section::with_endian(endian),
            thread_id: 0,
            exception_code: 0,
            exception_flags: 0,
            exception_address: 0,
            parameters: Vec::new(),
            thread_context: None,
        }
    }

    pub fn thread_context<T: DumpSection>(mut self, context: &T) -> Self {
        self.thread_context = Some((context.file_size(), context.file_offset()));
        self
    }
}

impl_dumpsection!(Exception);

impl From<Exception> for Section {
    fn from(exception: Exception) -> Self {
        let mut section = exception
            .section
            .D32(exception.thread_id)
            .D32(0) // __align
            .D32(exception.exception_code)
            .D32(exception.exception_flags)
            .D64(0) // exception_record
            .D64(exception.exception_address)
            .D32(exception.parameters.len() as u32)
            .D32(0); // __align
        for i in 0..15 {
            section = section.D64(exception.parameters.get(i).copied().unwrap_or(0));
        }
        section.cite_location(&exception.thread_context)
    }
}

impl Stream for Exception {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::ExceptionStream.into()
    }
}

/// Breakpad's `MINIDUMP_BREAKPAD_INFO`.
pub struct BreakpadInfo {
    section: Section,
}

impl BreakpadInfo {
    pub fn new(endian: Endian, dump_thread_id: Option<u32>, requesting_thread_id: Option<u32>) -> Self {
        let mut validity = md::BreakpadInfoValid::empty();
        if dump_thread_id.is_some() {
            validity |= md::BreakpadInfoValid::DumpThreadId;
        }
        if requesting_thread_id.is_some() {
            validity |= md::BreakpadInfoValid::RequestingThreadId;
        }
        let section = Section::with_endian(endian)
            .D32(validity.bits())
            .D32(dump_thread_id.unwrap_or_default())
            .D32(requesting_thread_id.unwrap_or_default());
        Self { section }
    }
}

impl_dumpsection!(BreakpadInfo);

impl From<BreakpadInfo> for Section {
    fn from(info: BreakpadInfo) -> Self {
        info.section
    }
}

impl Stream for BreakpadInfo {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::BreakpadInfoStream.into()
    }
}

/// Breakpad's `MINIDUMP_ASSERTION_INFO`; the strings are truncated to 127 UTF-16 units.
pub struct AssertionInfo {
    section: Section,
}

impl AssertionInfo {
    pub fn new(
        endian: Endian,
        expression: &str,
        function: &str,
        file: &str,
        line: u32,
        ty: md::AssertionType,
    ) -> Self {
        let mut section = Section::with_endian(endian);
        for text in [expression, function, file] {
            let mut units: Vec<u16> = text.encode_utf16().take(127).collect();
            units.resize(128, 0);
            for unit in units {
                section = section.D16(unit);
            }
        }
        let section = section.D32(line).D32(ty as u32);
        Self { section }
    }
}

impl_dumpsection!(AssertionInfo);

impl From<AssertionInfo> for Section {
    fn from(info: AssertionInfo) -> Self {
        info.section
    }
}

impl Stream for AssertionInfo {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::AssertionInfoStream.into()
    }
}
