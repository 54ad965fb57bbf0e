// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! CPU register contexts.

use std::io;
use std::io::prelude::*;

use minidump_format::format as md;
use minidump_format::format::{ContextFlagsCpu, CONTEXT_CPU_MASK};
use scroll::ctx::SizeWith;
use scroll::Endian;
use tracing::debug;

use crate::cursor::ByteCursor;
use crate::error::DiagnosticKind;
use crate::system_info::Cpu;

/// The register state of a thread, or of the faulting thread at exception time.
///
/// Only the layouts listed here are decoded. A blob whose CPU cannot be pinned to one
/// of them is kept verbatim as `Unknown` rather than being read with a guessed layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterContext<'a> {
    X86(Box<md::CONTEXT_X86>),
    Amd64(Box<md::CONTEXT_AMD64>),
    Arm(Box<md::CONTEXT_ARM>),
    Arm64(Box<md::CONTEXT_ARM64>),
    Unknown {
        /// The first word of the blob, if there was one.
        context_flags: Option<u32>,
        bytes: &'a [u8],
    },
}

/// General-purpose registers for x86.
static X86_REGS: [&str; 10] = [
    "eip", "esp", "ebp", "ebx", "esi", "edi", "eax", "ecx", "edx", "efl",
];

/// General-purpose registers for x86-64.
static AMD64_REGS: [&str; 17] = [
    "rax", "rdx", "rcx", "rbx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15", "rip",
];

/// Names of `CONTEXT_ARM::iregs`, in order.
static ARM_REGS: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr",
    "pc",
];

/// Names of `CONTEXT_ARM64::iregs`, in order, followed by `pc`.
static ARM64_REGS: [&str; 33] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "fp", "lr", "sp", "pc",
];

/// Offset of `context_flags` in `CONTEXT_AMD64`, after the six home addresses.
const AMD64_FLAGS_OFFSET: u64 = 48;

impl<'a> RegisterContext<'a> {
    /// Decode a context blob.
    ///
    /// `cpu` is the architecture from the system info stream, when there is one. Without
    /// it the CPU tag in `context_flags` decides, except for AMD64 whose flags word sits
    /// after the home addresses and is recognized by the size of the blob. Any problem
    /// yields an `Unknown` context plus the diagnostic describing it.
    pub fn read(
        bytes: &'a [u8],
        endian: Endian,
        cpu: Option<Cpu>,
    ) -> (RegisterContext<'a>, Option<DiagnosticKind>) {
        let cursor = ByteCursor::new(bytes, endian);
        let flags = cursor.read_u32(0).ok();
        let cpu = match cpu {
            Some(Cpu::Unknown(_)) | None => Self::detect_cpu(&cursor),
            known => known,
        };
        let unknown = RegisterContext::Unknown {
            context_flags: flags,
            bytes,
        };
        let decoded = match cpu {
            Some(Cpu::X86) => cursor
                .read_fixed_struct(0)
                .map(|ctx| RegisterContext::X86(Box::new(ctx))),
            Some(Cpu::X86_64) => cursor
                .read_fixed_struct(0)
                .map(|ctx| RegisterContext::Amd64(Box::new(ctx))),
            Some(Cpu::Arm) => cursor
                .read_fixed_struct(0)
                .map(|ctx| RegisterContext::Arm(Box::new(ctx))),
            Some(Cpu::Arm64) => cursor
                .read_fixed_struct(0)
                .map(|ctx| RegisterContext::Arm64(Box::new(ctx))),
            _ => {
                debug!("no context layout for {} byte blob", bytes.len());
                let context_flags = flags.unwrap_or_default();
                return (
                    unknown,
                    Some(DiagnosticKind::UnrecognizedArchitecture { context_flags }),
                );
            }
        };
        match decoded {
            Ok(context) => (context, None),
            Err(err) => (
                unknown,
                Some(DiagnosticKind::TruncatedStream {
                    detail: format!("register context: {err}"),
                }),
            ),
        }
    }

    fn detect_cpu(cursor: &ByteCursor<'_>) -> Option<Cpu> {
        let amd64_size = md::CONTEXT_AMD64::size_with(&cursor.endian());
        let amd64_flags = cursor
            .read_u32(AMD64_FLAGS_OFFSET)
            .map(ContextFlagsCpu::from_flags);
        if cursor.len() == amd64_size && amd64_flags == Ok(ContextFlagsCpu::CONTEXT_AMD64) {
            return Some(Cpu::X86_64);
        }

        let flags = cursor.read_u32(0).ok()?;
        match ContextFlagsCpu::from_flags(flags) {
            ContextFlagsCpu::CONTEXT_X86 => Some(Cpu::X86),
            ContextFlagsCpu::CONTEXT_ARM => Some(Cpu::Arm),
            ContextFlagsCpu::CONTEXT_ARM64 => Some(Cpu::Arm64),
            // Some writers append extended state to the AMD64 context.
            _ if cursor.len() > amd64_size && amd64_flags == Ok(ContextFlagsCpu::CONTEXT_AMD64) => {
                Some(Cpu::X86_64)
            }
            _ => None,
        }
    }

    pub fn cpu(&self) -> Option<Cpu> {
        match self {
            RegisterContext::X86(_) => Some(Cpu::X86),
            RegisterContext::Amd64(_) => Some(Cpu::X86_64),
            RegisterContext::Arm(_) => Some(Cpu::Arm),
            RegisterContext::Arm64(_) => Some(Cpu::Arm64),
            RegisterContext::Unknown { .. } => None,
        }
    }

    pub fn context_flags(&self) -> Option<u32> {
        match self {
            RegisterContext::X86(ctx) => Some(ctx.context_flags),
            RegisterContext::Amd64(ctx) => Some(ctx.context_flags),
            RegisterContext::Arm(ctx) => Some(ctx.context_flags),
            RegisterContext::Arm64(ctx) => Some(ctx.context_flags),
            RegisterContext::Unknown { context_flags, .. } => *context_flags,
        }
    }

    pub fn instruction_pointer(&self) -> Option<u64> {
        match self {
            RegisterContext::X86(ctx) => Some(ctx.eip as u64),
            RegisterContext::Amd64(ctx) => Some(ctx.rip),
            RegisterContext::Arm(ctx) => {
                Some(ctx.iregs[md::ArmRegisterNumbers::ProgramCounter as usize] as u64)
            }
            RegisterContext::Arm64(ctx) => Some(ctx.pc),
            RegisterContext::Unknown { .. } => None,
        }
    }

    pub fn stack_pointer(&self) -> Option<u64> {
        match self {
            RegisterContext::X86(ctx) => Some(ctx.esp as u64),
            RegisterContext::Amd64(ctx) => Some(ctx.rsp),
            RegisterContext::Arm(ctx) => {
                Some(ctx.iregs[md::ArmRegisterNumbers::StackPointer as usize] as u64)
            }
            RegisterContext::Arm64(ctx) => {
                Some(ctx.iregs[md::Arm64RegisterNumbers::StackPointer as usize])
            }
            RegisterContext::Unknown { .. } => None,
        }
    }

    /// Names of the general purpose registers of this context's CPU.
    pub fn general_purpose_registers(&self) -> &'static [&'static str] {
        match self {
            RegisterContext::X86(_) => &X86_REGS[..],
            RegisterContext::Amd64(_) => &AMD64_REGS[..],
            RegisterContext::Arm(_) => &ARM_REGS[..],
            RegisterContext::Arm64(_) => &ARM64_REGS[..],
            RegisterContext::Unknown { .. } => &[],
        }
    }

    pub fn get_register(&self, reg: &str) -> Option<u64> {
        match self {
            RegisterContext::X86(raw) => match reg {
                "eip" => Some(raw.eip),
                "esp" => Some(raw.esp),
                "ebp" => Some(raw.ebp),
                "ebx" => Some(raw.ebx),
                "esi" => Some(raw.esi),
                "edi" => Some(raw.edi),
                "eax" => Some(raw.eax),
                "ecx" => Some(raw.ecx),
                "edx" => Some(raw.edx),
                "efl" => Some(raw.eflags),
                _ => None,
            }
            .map(|r| r as u64),
            RegisterContext::Amd64(raw) => match reg {
                "rax" => Some(raw.rax),
                "rdx" => Some(raw.rdx),
                "rcx" => Some(raw.rcx),
                "rbx" => Some(raw.rbx),
                "rsi" => Some(raw.rsi),
                "rdi" => Some(raw.rdi),
                "rbp" => Some(raw.rbp),
                "rsp" => Some(raw.rsp),
                "r8" => Some(raw.r8),
                "r9" => Some(raw.r9),
                "r10" => Some(raw.r10),
                "r11" => Some(raw.r11),
                "r12" => Some(raw.r12),
                "r13" => Some(raw.r13),
                "r14" => Some(raw.r14),
                "r15" => Some(raw.r15),
                "rip" => Some(raw.rip),
                _ => None,
            },
            RegisterContext::Arm(raw) => ARM_REGS
                .iter()
                .position(|name| *name == reg)
                .map(|i| raw.iregs[i] as u64),
            RegisterContext::Arm64(raw) => match reg {
                "pc" => Some(raw.pc),
                _ => ARM64_REGS[..32]
                    .iter()
                    .position(|name| *name == reg)
                    .map(|i| raw.iregs[i]),
            },
            RegisterContext::Unknown { .. } => None,
        }
    }

    /// Every general purpose register with its value, in display order.
    pub fn registers(&self) -> Vec<(&'static str, u64)> {
        self.general_purpose_registers()
            .iter()
            .filter_map(|reg| self.get_register(reg).map(|val| (*reg, val)))
            .collect()
    }

    /// Write a human-readable description of this context to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        let title = match self {
            RegisterContext::X86(_) => "MDRawContextX86",
            RegisterContext::Amd64(_) => "MDRawContextAMD64",
            RegisterContext::Arm(_) => "MDRawContextARM",
            RegisterContext::Arm64(_) => "MDRawContextARM64",
            RegisterContext::Unknown { context_flags, bytes } => {
                writeln!(f, "MDRawContext (unrecognized)")?;
                match context_flags {
                    Some(flags) => writeln!(
                        f,
                        "  context_flags = {:#x} (cpu {:#x})",
                        flags,
                        flags & CONTEXT_CPU_MASK
                    )?,
                    None => writeln!(f, "  context_flags = (missing)")?,
                }
                return write!(f, "  size          = {}\n\n", bytes.len());
            }
        };
        writeln!(f, "{title}")?;
        writeln!(
            f,
            "  context_flags = {:#x}",
            self.context_flags().unwrap_or_default()
        )?;
        for (reg, val) in self.registers() {
            writeln!(f, "  {:<13} = {:#x}", reg, val)?;
        }
        match self {
            RegisterContext::X86(raw) => writeln!(f, "  {:<13} = {:#x}", "cs", raw.cs)?,
            RegisterContext::Amd64(raw) => writeln!(f, "  {:<13} = {:#x}", "eflags", raw.eflags)?,
            RegisterContext::Arm(raw) => writeln!(f, "  {:<13} = {:#x}", "cpsr", raw.cpsr)?,
            RegisterContext::Arm64(raw) => writeln!(f, "  {:<13} = {:#x}", "cpsr", raw.cpsr)?,
            RegisterContext::Unknown { .. } => {}
        }
        writeln!(f)
    }
}
