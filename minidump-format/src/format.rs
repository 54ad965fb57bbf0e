// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Minidump record layouts.
//!
//! Names follow [Microsoft's minidumpapiset.h][msdn] and, for extension streams,
//! Breakpad's `minidump_format.h`, so that the records can be compared field by field
//! against those headers.
//!
//! [msdn]: https://docs.microsoft.com/en-us/windows/desktop/api/minidumpapiset/
#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use bitflags::bitflags;
use enum_primitive_derive::Primitive;
use scroll::{Endian, Pread, SizeWith};
use smart_default::SmartDefault;

/// A byte offset from the start of the minidump.
pub type RVA = u32;

/// The magic number at offset 0, 'MDMP' when read little-endian.
pub const MINIDUMP_SIGNATURE: u32 = 0x504d444d;

/// The only container version in use. Only the low 16 bits of the header field are compared.
pub const MINIDUMP_VERSION: u32 = 42899;

/// The fixed header at offset 0.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_HEADER {
    /// Must be [`MINIDUMP_SIGNATURE`].
    pub signature: u32,
    /// The low 16 bits must be [`MINIDUMP_VERSION`]; the high bits are implementation specific.
    pub version: u32,
    pub stream_count: u32,
    /// Offset of an array of `stream_count` [`MINIDUMP_DIRECTORY`] entries.
    pub stream_directory_rva: RVA,
    pub checksum: u32,
    /// Capture time, seconds since the Unix epoch.
    pub time_date_stamp: u32,
    pub flags: u64,
}

/// A (size, offset) pair locating data elsewhere in the file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_LOCATION_DESCRIPTOR {
    pub data_size: u32,
    pub rva: RVA,
}

/// A captured range of process memory.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR {
    /// Address of the range in the crashed process.
    pub start_of_memory_range: u64,
    pub memory: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// An entry of the `Memory64ListStream`.
///
/// There is no RVA: the ranges are stored back to back starting at the list's `base_rva`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR64 {
    pub start_of_memory_range: u64,
    pub data_size: u64,
}

/// Fixed part of the `Memory64ListStream`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY64_LIST {
    pub number_of_memory_ranges: u64,
    pub base_rva: u64,
}

/// One entry of the stream directory.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_DIRECTORY {
    /// Usually a [`MINIDUMP_STREAM_TYPE`], but any value is legal.
    pub stream_type: u32,
    pub location: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// Stream type codes.
///
/// Values up to `LastReservedStream` are Microsoft's; `0x4767xxxx` are Breakpad
/// extensions ("Gg") and `0x4350xxxx` Crashpad ones ("CP").
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Primitive)]
pub enum MINIDUMP_STREAM_TYPE {
    UnusedStream = 0,
    ReservedStream0 = 1,
    ReservedStream1 = 2,
    /// A u32 count followed by [`MINIDUMP_THREAD`] entries.
    ThreadListStream = 3,
    /// A u32 count followed by [`MINIDUMP_MODULE`] entries.
    ModuleListStream = 4,
    /// A u32 count followed by [`MINIDUMP_MEMORY_DESCRIPTOR`] entries.
    MemoryListStream = 5,
    /// A [`MINIDUMP_EXCEPTION_STREAM`].
    ExceptionStream = 6,
    /// A [`MINIDUMP_SYSTEM_INFO`].
    SystemInfoStream = 7,
    ThreadExListStream = 8,
    /// A [`MINIDUMP_MEMORY64_LIST`] followed by [`MINIDUMP_MEMORY_DESCRIPTOR64`] entries.
    Memory64ListStream = 9,
    CommentStreamA = 10,
    CommentStreamW = 11,
    HandleDataStream = 12,
    FunctionTable = 13,
    /// Extended list header followed by [`MINIDUMP_UNLOADED_MODULE`] entries.
    UnloadedModuleListStream = 14,
    /// One of the `MINIDUMP_MISC_INFO*` structs, discriminated by `size_of_info`.
    MiscInfoStream = 15,
    /// Extended list header followed by [`MINIDUMP_MEMORY_INFO`] entries.
    MemoryInfoListStream = 16,
    ThreadInfoListStream = 17,
    HandleOperationListStream = 18,
    TokenStream = 19,
    JavaScriptDataStream = 20,
    SystemMemoryInfoStream = 21,
    ProcessVmCountersStream = 22,
    IptTraceStream = 23,
    /// A u32 count followed by [`MINIDUMP_THREAD_NAME`] entries.
    ThreadNamesStream = 24,
    LastReservedStream = 0x0000ffff,
    /// A [`MINIDUMP_BREAKPAD_INFO`].
    BreakpadInfoStream = 0x47670001,
    /// A [`MINIDUMP_ASSERTION_INFO`].
    AssertionInfoStream = 0x47670002,
    /// Contents of `/proc/cpuinfo`
    LinuxCpuInfo = 0x47670003,
    /// Contents of `/proc/self/status`
    LinuxProcStatus = 0x47670004,
    /// Contents of `/etc/lsb-release`
    LinuxLsbRelease = 0x47670005,
    /// Contents of `/proc/self/cmdline`
    LinuxCmdLine = 0x47670006,
    /// Contents of `/proc/self/environ`
    LinuxEnviron = 0x47670007,
    /// Contents of `/proc/self/auxv`
    LinuxAuxv = 0x47670008,
    /// Contents of `/proc/self/maps`
    LinuxMaps = 0x47670009,
    LinuxDsoDebug = 0x4767000A,
    CrashpadInfoStream = 0x43500001,
}

impl From<MINIDUMP_STREAM_TYPE> for u32 {
    fn from(ty: MINIDUMP_STREAM_TYPE) -> Self {
        ty as u32
    }
}

/// A loaded executable or shared library.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MODULE {
    pub base_of_image: u64,
    pub size_of_image: u32,
    pub checksum: u32,
    pub time_date_stamp: u32,
    /// Offset of a MINIDUMP_STRING holding the module path.
    pub module_name_rva: RVA,
    pub version_info: VS_FIXEDFILEINFO,
    /// Location of one of the `CV_INFO_*` records.
    pub cv_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub misc_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub reserved0: [u32; 2],
    pub reserved1: [u32; 2],
}

/// Version resource of a module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct VS_FIXEDFILEINFO {
    /// [`VS_FFI_SIGNATURE`] when the rest of the struct is meaningful.
    pub signature: u32,
    pub struct_version: u32,
    pub file_version_hi: u32,
    pub file_version_lo: u32,
    pub product_version_hi: u32,
    pub product_version_lo: u32,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_hi: u32,
    pub file_date_lo: u32,
}

pub const VS_FFI_SIGNATURE: u32 = 0xfeef04bd;

pub const VS_FFI_STRUCVERSION: u32 = 0x00010000;

/// A module that had been unloaded before the dump was written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_UNLOADED_MODULE {
    pub base_of_image: u64,
    pub size_of_image: u32,
    pub checksum: u32,
    pub time_date_stamp: u32,
    pub module_name_rva: RVA,
}

/// First four bytes of a CodeView record.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum CvSignature {
    /// 'NB10'
    Pdb20 = 0x3031424e,
    /// 'RSDS'
    Pdb70 = 0x53445352,
    /// 'BpEL', Breakpad's ELF build id record
    Elf = 0x4270454c,
    /// 'NB09'
    Cv41 = 0x3930424e,
    /// 'NB11'
    Cv50 = 0x3131424e,
}

/// PDB 2.0 CodeView record, variable length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CV_INFO_PDB20<'a> {
    pub cv_signature: u32,
    pub cv_offset: u32,
    pub signature: u32,
    pub age: u32,
    /// NUL-terminated, in no particular encoding.
    pub pdb_file_name: &'a [u8],
}

impl<'a> scroll::ctx::TryFromCtx<'a, Endian> for CV_INFO_PDB20<'a> {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], endian: Endian) -> Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        let cv_signature = src.gread_with(offset, endian)?;
        let cv_offset = src.gread_with(offset, endian)?;
        let signature = src.gread_with(offset, endian)?;
        let age = src.gread_with(offset, endian)?;
        let pdb_file_name = &src[*offset..];
        *offset = src.len();
        Ok((
            CV_INFO_PDB20 {
                cv_signature,
                cv_offset,
                signature,
                age,
                pdb_file_name,
            },
            *offset,
        ))
    }
}

/// PDB 7.0 CodeView record, variable length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CV_INFO_PDB70<'a> {
    pub cv_signature: u32,
    pub signature: GUID,
    pub age: u32,
    /// NUL-terminated UTF-8.
    pub pdb_file_name: &'a [u8],
}

impl<'a> scroll::ctx::TryFromCtx<'a, Endian> for CV_INFO_PDB70<'a> {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], endian: Endian) -> Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        let cv_signature = src.gread_with(offset, endian)?;
        let signature = src.gread_with(offset, endian)?;
        let age = src.gread_with(offset, endian)?;
        let pdb_file_name = &src[*offset..];
        *offset = src.len();
        Ok((
            CV_INFO_PDB70 {
                cv_signature,
                signature,
                age,
                pdb_file_name,
            },
            *offset,
        ))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Breakpad's build id record for ELF modules, variable length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CV_INFO_ELF<'a> {
    pub cv_signature: u32,
    pub build_id: &'a [u8],
}

impl<'a> scroll::ctx::TryFromCtx<'a, Endian> for CV_INFO_ELF<'a> {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], endian: Endian) -> Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        let cv_signature = src.gread_with(offset, endian)?;
        let build_id = &src[*offset..];
        Ok((
            CV_INFO_ELF {
                cv_signature,
                build_id,
            },
            src.len(),
        ))
    }
}

/// A thread of the crashed process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_THREAD {
    pub thread_id: u32,
    /// Non-zero means the thread was suspended.
    pub suspend_count: u32,
    pub priority_class: u32,
    pub priority: u32,
    /// Address of the thread environment block.
    pub teb: u64,
    pub stack: MINIDUMP_MEMORY_DESCRIPTOR,
    /// Location of one of the `CONTEXT_*` structs.
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// An entry of the `ThreadNamesStream`.
///
/// The name RVA is 64 bits wide and unaligned, so the record is 12 bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_THREAD_NAME {
    pub thread_id: u32,
    pub thread_name_rva: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_EXCEPTION_STREAM {
    /// The thread that hit the exception.
    pub thread_id: u32,
    pub __align: u32,
    pub exception_record: MINIDUMP_EXCEPTION,
    /// Register state at the time of the exception.
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_EXCEPTION {
    pub exception_code: u32,
    pub exception_flags: u32,
    /// Address of a chained exception record in the producer's memory.
    pub exception_record: u64,
    pub exception_address: u64,
    /// How many entries of `exception_information` are meaningful.
    pub number_parameters: u32,
    pub __align: u32,
    pub exception_information: [u64; 15],
}

/// The bits of `context_flags` that identify the CPU.
pub const CONTEXT_CPU_MASK: u32 = 0xffffff00;

bitflags! {
    /// CPU identifiers found in the `context_flags` word of a `CONTEXT_*` struct.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ContextFlagsCpu: u32 {
        const CONTEXT_IA64 = 0x80000;
        const CONTEXT_SHX = 0xc0;
        const CONTEXT_ARM_OLD = 0x40;
        const CONTEXT_ALPHA = 0x20000;
        const CONTEXT_AMD64 = 0x100000;
        const CONTEXT_ARM = 0x40000000;
        const CONTEXT_ARM64 = 0x400000;
        const CONTEXT_ARM64_OLD = 0x80000000;
        const CONTEXT_MIPS = 0x40000;
        const CONTEXT_PPC = 0x20000000;
        const CONTEXT_PPC64 = 0x1000000;
        const CONTEXT_SPARC = 0x10000000;
        const CONTEXT_X86 = 0x10000;
    }
}

impl ContextFlagsCpu {
    /// Keep only the CPU bits of `flags`.
    pub fn from_flags(flags: u32) -> ContextFlagsCpu {
        ContextFlagsCpu::from_bits_truncate(flags & CONTEXT_CPU_MASK)
    }
}

/// x87 state, as in WinNT.h.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct FLOATING_SAVE_AREA_X86 {
    pub control_word: u32,
    pub status_word: u32,
    pub tag_word: u32,
    pub error_offset: u32,
    pub error_selector: u32,
    pub data_offset: u32,
    pub data_selector: u32,
    #[default([0; 80])]
    pub register_area: [u8; 80],
    pub cr0_npx_state: u32,
}

/// `CONTEXT` for x86, as in WinNT.h.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_X86 {
    pub context_flags: u32,
    pub dr0: u32,
    pub dr1: u32,
    pub dr2: u32,
    pub dr3: u32,
    pub dr6: u32,
    pub dr7: u32,
    pub float_save: FLOATING_SAVE_AREA_X86,
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub ebp: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
    #[default([0; 512])]
    pub extended_registers: [u8; 512],
}

/// `CONTEXT` for x86-64, as in WinNT.h.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_AMD64 {
    pub p1_home: u64,
    pub p2_home: u64,
    pub p3_home: u64,
    pub p4_home: u64,
    pub p5_home: u64,
    pub p6_home: u64,
    pub context_flags: u32,
    pub mx_csr: u32,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    pub ss: u16,
    pub eflags: u32,
    pub dr0: u64,
    pub dr1: u64,
    pub dr2: u64,
    pub dr3: u64,
    pub dr6: u64,
    pub dr7: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    /// XMM_SAVE_AREA32 or the legacy SSE layout; left uninterpreted.
    #[default([0; 512])]
    pub float_save: [u8; 512],
    #[default([0; 26])]
    pub vector_register: [u128; 26],
    pub vector_control: u64,
    pub debug_control: u64,
    pub last_branch_to_rip: u64,
    pub last_branch_from_rip: u64,
    pub last_exception_to_rip: u64,
    pub last_exception_from_rip: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct FLOATING_SAVE_AREA_ARM {
    pub fpscr: u64,
    #[default([0; 32])]
    pub regs: [u64; 32],
    pub extra: [u32; 8],
}

/// Breakpad's 32-bit ARM context.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_ARM {
    pub context_flags: u32,
    pub iregs: [u32; 16],
    pub cpsr: u32,
    pub float_save: FLOATING_SAVE_AREA_ARM,
}

/// Indices into `CONTEXT_ARM::iregs`.
#[repr(usize)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArmRegisterNumbers {
    IosFramePointer = 7,
    FramePointer = 11,
    StackPointer = 13,
    LinkRegister = 14,
    ProgramCounter = 15,
}

#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct FLOATING_SAVE_AREA_ARM64 {
    #[default([0; 32])]
    pub regs: [u128; 32],
    pub fpsr: u32,
    pub fpcr: u32,
}

/// Breakpad's aarch64 context.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_ARM64 {
    pub context_flags: u32,
    pub cpsr: u32,
    #[default([0; 32])]
    pub iregs: [u64; 32],
    pub pc: u64,
    pub float_save: FLOATING_SAVE_AREA_ARM64,
    pub bcr: [u32; 8],
    pub bvr: [u64; 8],
    pub wcr: [u32; 2],
    pub wvr: [u64; 2],
}

/// Indices into `CONTEXT_ARM64::iregs`.
#[repr(usize)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Arm64RegisterNumbers {
    FramePointer = 29,
    LinkRegister = 30,
    StackPointer = 31,
}

/// The CPU union of `MINIDUMP_SYSTEM_INFO`, kept as raw bytes.
///
/// Read an [`X86CpuInfo`] or [`ARMCpuInfo`] out of `data` once the architecture is known.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct CPU_INFORMATION {
    pub data: [u8; 24],
}

#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct X86CpuInfo {
    /// `cpuid` vendor string, e.g. "GenuineIntel", as three little-endian words.
    pub vendor_id: [u32; 3],
    pub version_information: u32,
    pub feature_information: u32,
    pub amd_extended_cpu_features: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct ARMCpuInfo {
    pub cpuid: u32,
    pub elf_hwcaps: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_SYSTEM_INFO {
    /// See [`ProcessorArchitecture`].
    pub processor_architecture: u16,
    pub processor_level: u16,
    /// For x86, 0xMMSS where MM is the model and SS the stepping.
    pub processor_revision: u16,
    pub number_of_processors: u8,
    pub product_type: u8,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    /// See [`PlatformId`].
    pub platform_id: u32,
    /// Offset of a MINIDUMP_STRING naming the service pack, or 0.
    pub csd_version_rva: RVA,
    pub suite_mask: u16,
    pub reserved2: u16,
    pub cpu: CPU_INFORMATION,
}

/// Values of `MINIDUMP_SYSTEM_INFO::processor_architecture`.
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ProcessorArchitecture {
    PROCESSOR_ARCHITECTURE_INTEL = 0,
    PROCESSOR_ARCHITECTURE_MIPS = 1,
    PROCESSOR_ARCHITECTURE_ALPHA = 2,
    PROCESSOR_ARCHITECTURE_PPC = 3,
    PROCESSOR_ARCHITECTURE_SHX = 4,
    PROCESSOR_ARCHITECTURE_ARM = 5,
    PROCESSOR_ARCHITECTURE_IA64 = 6,
    PROCESSOR_ARCHITECTURE_ALPHA64 = 7,
    PROCESSOR_ARCHITECTURE_MSIL = 8,
    PROCESSOR_ARCHITECTURE_AMD64 = 9,
    /// WoW64
    PROCESSOR_ARCHITECTURE_IA32_ON_WIN64 = 10,
    PROCESSOR_ARCHITECTURE_ARM64 = 12,
    /// Breakpad
    PROCESSOR_ARCHITECTURE_SPARC = 0x8001,
    /// Breakpad
    PROCESSOR_ARCHITECTURE_PPC64 = 0x8002,
    /// Breakpad
    PROCESSOR_ARCHITECTURE_ARM64_OLD = 0x8003,
    /// Breakpad
    PROCESSOR_ARCHITECTURE_MIPS64 = 0x8004,
    PROCESSOR_ARCHITECTURE_UNKNOWN = 0xffff,
}

/// Values of `MINIDUMP_SYSTEM_INFO::platform_id`.
///
/// Everything from `Unix` on is a Breakpad extension.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum PlatformId {
    VER_PLATFORM_WIN32s = 1,
    VER_PLATFORM_WIN32_WINDOWS = 2,
    VER_PLATFORM_WIN32_NT = 3,
    VER_PLATFORM_WIN32_CE = 4,
    Unix = 0x8000,
    MacOs = 0x8101,
    Ios = 0x8102,
    Linux = 0x8201,
    Solaris = 0x8202,
    Android = 0x8203,
    Ps3 = 0x8204,
    NaCl = 0x8205,
}

/// The first revision of the misc info stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MISC_INFO {
    pub size_of_info: u32,
    /// See [`MiscInfoFlags`].
    pub flags1: u32,
    pub process_id: u32,
    pub process_create_time: u32,
    pub process_user_time: u32,
    pub process_kernel_time: u32,
}

/// The second revision, which appends processor power information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MISC_INFO2 {
    pub size_of_info: u32,
    pub flags1: u32,
    pub process_id: u32,
    pub process_create_time: u32,
    pub process_user_time: u32,
    pub process_kernel_time: u32,
    pub processor_max_mhz: u32,
    pub processor_current_mhz: u32,
    pub processor_mhz_limit: u32,
    pub processor_max_idle_state: u32,
    pub processor_current_idle_state: u32,
}

bitflags! {
    /// Which fields of a misc info stream are valid.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MiscInfoFlags: u32 {
        const MINIDUMP_MISC1_PROCESS_ID            = 0x00000001;
        const MINIDUMP_MISC1_PROCESS_TIMES         = 0x00000002;
        const MINIDUMP_MISC1_PROCESSOR_POWER_INFO  = 0x00000004;
        const MINIDUMP_MISC3_PROCESS_INTEGRITY     = 0x00000010;
        const MINIDUMP_MISC3_PROCESS_EXECUTE_FLAGS = 0x00000020;
        const MINIDUMP_MISC3_TIMEZONE              = 0x00000040;
        const MINIDUMP_MISC3_PROTECTED_PROCESS     = 0x00000080;
        const MINIDUMP_MISC4_BUILDSTRING           = 0x00000100;
        const MINIDUMP_MISC5_PROCESS_COOKIE        = 0x00000200;
    }
}

/// Region metadata, an entry of the `MemoryInfoListStream`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_INFO {
    pub base_address: u64,
    pub allocation_base: u64,
    /// See [`MemoryProtection`].
    pub allocation_protection: u32,
    pub __alignment1: u32,
    pub region_size: u64,
    /// See [`MemoryState`].
    pub state: u32,
    /// See [`MemoryProtection`].
    pub protection: u32,
    /// See [`MemoryType`].
    pub _type: u32,
    pub __alignment2: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MemoryState: u32 {
        const MEM_COMMIT  = 0x01000;
        const MEM_FREE    = 0x10000;
        const MEM_RESERVE = 0x02000;
    }
}

bitflags! {
    /// Page protection constants.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MemoryProtection: u32 {
        const PAGE_NOACCESS           = 0x01;
        const PAGE_READONLY           = 0x02;
        const PAGE_READWRITE          = 0x04;
        const PAGE_WRITECOPY          = 0x08;
        const PAGE_EXECUTE            = 0x10;
        const PAGE_EXECUTE_READ       = 0x20;
        const PAGE_EXECUTE_READWRITE  = 0x40;
        const PAGE_EXECUTE_WRITECOPY  = 0x80;
        const ACCESS_MASK             = 0xff;
        const PAGE_GUARD              = 0x100;
        const PAGE_NOCACHE            = 0x200;
        const PAGE_WRITECOMBINE       = 0x400;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MemoryType: u32 {
        const MEM_PRIVATE = 0x00020000;
        const MEM_MAPPED  = 0x00040000;
        const MEM_IMAGE   = 0x01000000;
    }
}

/// Breakpad's record of which threads wrote and requested the dump.
#[derive(Clone, Debug, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_BREAKPAD_INFO {
    /// See [`BreakpadInfoValid`].
    pub validity: u32,
    pub dump_thread_id: u32,
    pub requesting_thread_id: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BreakpadInfoValid: u32 {
        const DumpThreadId       = 1 << 0;
        const RequestingThreadId = 1 << 1;
    }
}

/// Breakpad's description of a failed assertion.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_ASSERTION_INFO {
    /// NUL-padded UTF-16.
    pub expression: [u16; 128],
    pub function: [u16; 128],
    pub file: [u16; 128],
    pub line: u32,
    /// See [`AssertionType`].
    pub _type: u32,
}

#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum AssertionType {
    Unknown = 0,
    InvalidParameter = 1,
    PureVirtualCall = 2,
}

/// Crashpad's process-wide annotations, the payload of `CrashpadInfoStream`.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_CRASHPAD_INFO {
    /// Zero is invalid; later versions extend version 1.
    pub version: u32,
    /// Identifies this report to the crash server.
    pub report_id: GUID,
    /// Identifies the client installation across reports.
    pub client_id: GUID,
    /// A [`MINIDUMP_SIMPLE_STRING_DICTIONARY_ENTRY`] list.
    pub simple_annotations: MINIDUMP_LOCATION_DESCRIPTOR,
    /// A [`MINIDUMP_MODULE_CRASHPAD_INFO_LINK`] list.
    pub module_list: MINIDUMP_LOCATION_DESCRIPTOR,
}

impl MINIDUMP_CRASHPAD_INFO {
    pub const VERSION: u32 = 1;
}

/// One key/value pair; both are `MINIDUMP_UTF8_STRING` RVAs.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_SIMPLE_STRING_DICTIONARY_ENTRY {
    pub key: RVA,
    pub value: RVA,
}

/// Ties a [`MINIDUMP_MODULE_CRASHPAD_INFO`] to an entry of the module list.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MODULE_CRASHPAD_INFO_LINK {
    pub minidump_module_list_index: u32,
    pub location: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// Annotations registered by one module.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MODULE_CRASHPAD_INFO {
    pub version: u32,
    /// A counted list of `MINIDUMP_UTF8_STRING` RVAs.
    pub list_annotations: MINIDUMP_LOCATION_DESCRIPTOR,
    pub simple_annotations: MINIDUMP_LOCATION_DESCRIPTOR,
    /// A [`MINIDUMP_ANNOTATION`] list.
    pub annotation_objects: MINIDUMP_LOCATION_DESCRIPTOR,
}

impl MINIDUMP_MODULE_CRASHPAD_INFO {
    pub const VERSION: u32 = 1;
}

/// A typed annotation object.
#[derive(Clone, Debug, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_ANNOTATION {
    /// RVA of a `MINIDUMP_UTF8_STRING`.
    pub name: RVA,
    pub ty: u16,
    pub _reserved: u16,
    /// RVA of a u32 length followed by that many bytes, no terminator.
    pub value: RVA,
}

impl MINIDUMP_ANNOTATION {
    pub const TYPE_INVALID: u16 = 0;
    pub const TYPE_STRING: u16 = 1;
    /// This and every higher type code belongs to the application.
    pub const TYPE_USER_DEFINED: u16 = 0x8000;
}

#[cfg(test)]
mod test {
    use super::*;
    use num_traits::FromPrimitive;
    use scroll::ctx::SizeWith;
    use scroll::LE;

    #[test]
    fn test_record_sizes() {
        assert_eq!(MINIDUMP_HEADER::size_with(&LE), 32);
        assert_eq!(MINIDUMP_DIRECTORY::size_with(&LE), 12);
        assert_eq!(MINIDUMP_MODULE::size_with(&LE), 108);
        assert_eq!(MINIDUMP_UNLOADED_MODULE::size_with(&LE), 24);
        assert_eq!(MINIDUMP_THREAD::size_with(&LE), 48);
        assert_eq!(MINIDUMP_THREAD_NAME::size_with(&LE), 12);
        assert_eq!(MINIDUMP_EXCEPTION_STREAM::size_with(&LE), 168);
        assert_eq!(MINIDUMP_SYSTEM_INFO::size_with(&LE), 56);
        assert_eq!(MINIDUMP_MEMORY_INFO::size_with(&LE), 48);
        assert_eq!(MINIDUMP_MISC_INFO::size_with(&LE), 24);
        assert_eq!(MINIDUMP_MISC_INFO2::size_with(&LE), 44);
        assert_eq!(MINIDUMP_ASSERTION_INFO::size_with(&LE), 776);
        assert_eq!(MINIDUMP_CRASHPAD_INFO::size_with(&LE), 52);
        assert_eq!(MINIDUMP_MODULE_CRASHPAD_INFO_LINK::size_with(&LE), 12);
        assert_eq!(MINIDUMP_MODULE_CRASHPAD_INFO::size_with(&LE), 28);
        assert_eq!(MINIDUMP_ANNOTATION::size_with(&LE), 12);
    }

    #[test]
    fn test_context_sizes() {
        assert_eq!(CONTEXT_X86::size_with(&LE), 716);
        assert_eq!(CONTEXT_AMD64::size_with(&LE), 1232);
        assert_eq!(CONTEXT_ARM::size_with(&LE), 368);
        assert_eq!(CONTEXT_ARM64::size_with(&LE), 912);
    }

    #[test]
    fn test_stream_type_codes() {
        assert_eq!(
            MINIDUMP_STREAM_TYPE::from_u32(7),
            Some(MINIDUMP_STREAM_TYPE::SystemInfoStream)
        );
        assert_eq!(
            MINIDUMP_STREAM_TYPE::from_u32(0x47670002),
            Some(MINIDUMP_STREAM_TYPE::AssertionInfoStream)
        );
        assert_eq!(MINIDUMP_STREAM_TYPE::from_u32(0x11223344), None);
        assert_eq!(u32::from(MINIDUMP_STREAM_TYPE::ThreadNamesStream), 24);
    }

    #[test]
    fn test_cpu_flags() {
        assert_eq!(
            ContextFlagsCpu::from_flags(0x1007f),
            ContextFlagsCpu::CONTEXT_X86
        );
        assert_eq!(
            ContextFlagsCpu::from_flags(0x10001f),
            ContextFlagsCpu::CONTEXT_AMD64
        );
    }

    #[test]
    fn test_codeview_pdb70() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&(CvSignature::Pdb70 as u32).to_le_bytes());
        bytes.extend_from_slice(&0xabcd1234u32.to_le_bytes());
        bytes.extend_from_slice(&0xf00du16.to_le_bytes());
        bytes.extend_from_slice(&0xbeefu16.to_le_bytes());
        bytes.extend_from_slice(b"\x01\x02\x03\x04\x05\x06\x07\x08");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(b"foo.pdb\0");
        let cv: CV_INFO_PDB70 = bytes.pread_with(0, LE).unwrap();
        assert_eq!(cv.signature.data1, 0xabcd1234);
        assert_eq!(cv.age, 1);
        assert_eq!(cv.pdb_file_name, &b"foo.pdb\0"[..]);
    }
}
