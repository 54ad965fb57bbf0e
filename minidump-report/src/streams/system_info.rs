// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use scroll::Pread;
use std::fmt::Write as _;
use std::io;
use std::io::prelude::*;

use crate::cursor::ByteCursor;
use crate::streams::{DecodeContext, Diagnostics, StreamDecoder};
use crate::strings::read_string;
use crate::system_info::{Cpu, Os};

/// Information about the system that generated the minidump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemInfo {
    /// The `MINIDUMP_SYSTEM_INFO` direct from the minidump
    pub raw: md::MINIDUMP_SYSTEM_INFO,
    /// The operating system that generated the minidump
    pub os: Os,
    /// The CPU on which the minidump was generated
    pub cpu: Cpu,
    /// The service pack string, if the header cites one.
    pub csd_version: Option<String>,
    /// A description of the CPU derived from the CPU information union, such as
    /// "GenuineIntel family 6 model 13 stepping 8".
    pub cpu_info: Option<String>,
}

/// Implementer ids of ARM `cpuid` values.
const ARM_VENDORS: [(u32, &str); 4] = [
    (0x41, "ARM"),
    (0x51, "Qualcomm"),
    (0x56, "Marvell"),
    (0x69, "Intel/Marvell"),
];

/// Implementer and part number bits of ARM `cpuid` values.
const ARM_PARTS: [(u32, &str); 15] = [
    (0x4100c050, "Cortex-A5"),
    (0x4100c080, "Cortex-A8"),
    (0x4100c090, "Cortex-A9"),
    (0x4100c0f0, "Cortex-A15"),
    (0x4100c140, "Cortex-R4"),
    (0x4100c150, "Cortex-R5"),
    (0x4100b360, "ARM1136"),
    (0x4100b560, "ARM1156"),
    (0x4100b760, "ARM1176"),
    (0x4100b020, "ARM11-MPCore"),
    (0x41009260, "ARM926"),
    (0x41009460, "ARM946"),
    (0x41009660, "ARM966"),
    (0x510006f0, "Krait"),
    (0x510000f0, "Scorpion"),
];

impl<'a> StreamDecoder<'a> for SystemInfo {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::SystemInfoStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<SystemInfo> {
        let raw: md::MINIDUMP_SYSTEM_INFO = match payload.read_fixed_struct(0) {
            Ok(raw) => raw,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        let os = Os::from_platform_id(raw.platform_id);
        let cpu = Cpu::from_processor_architecture(raw.processor_architecture);

        let csd_version = match raw.csd_version_rva {
            0 => None,
            rva => Some(read_string(&ctx.dump, rva as u64).unwrap_or_else(|e| {
                diag.push(e);
                String::new()
            })),
        };
        let cpu_info = describe_cpu(&raw, cpu, ctx.endian());

        Some(SystemInfo {
            raw,
            os,
            cpu,
            csd_version,
            cpu_info,
        })
    }
}

/// Resolve the CPU information union for the CPU families that define it.
fn describe_cpu(raw: &md::MINIDUMP_SYSTEM_INFO, cpu: Cpu, endian: scroll::Endian) -> Option<String> {
    match cpu {
        Cpu::X86 | Cpu::X86_64 => {
            let mut cpu_info = String::new();
            if cpu == Cpu::X86 {
                let x86_info: md::X86CpuInfo = raw.cpu.data.pread_with(0, endian).ok()?;
                // The vendor string is stored as three little-endian words.
                cpu_info.extend(
                    x86_info
                        .vendor_id
                        .iter()
                        .flat_map(|word| word.to_le_bytes())
                        .filter(|&b| b != 0)
                        .map(char::from),
                );
                cpu_info.push(' ');
            }
            write!(
                cpu_info,
                "family {} model {} stepping {}",
                raw.processor_level,
                (raw.processor_revision >> 8) & 0xff,
                raw.processor_revision & 0xff
            )
            .ok()?;
            Some(cpu_info)
        }
        Cpu::Arm => {
            let arm_info: md::ARMCpuInfo = raw.cpu.data.pread_with(0, endian).ok()?;
            let mut cpu_info = format!("ARMv{}", raw.processor_level);
            let cpuid = arm_info.cpuid;
            if cpuid != 0 {
                let vendor_id = (cpuid >> 24) & 0xff;
                let part_id = cpuid & 0xff00fff0;
                match ARM_VENDORS.iter().find(|(id, _)| *id == vendor_id) {
                    Some((_, vendor)) => write!(cpu_info, " {vendor}").ok()?,
                    None => write!(cpu_info, " vendor({vendor_id:#x})").ok()?,
                }
                match ARM_PARTS.iter().find(|(id, _)| *id == part_id) {
                    Some((_, part)) => write!(cpu_info, " {part}").ok()?,
                    None => write!(cpu_info, " part({part_id:#x})").ok()?,
                }
            }
            Some(cpu_info)
        }
        _ => None,
    }
}

impl SystemInfo {
    /// The OS version as "major.minor.build", followed by the service pack if any.
    pub fn os_version(&self) -> String {
        let version = format!(
            "{}.{}.{}",
            self.raw.major_version, self.raw.minor_version, self.raw.build_number
        );
        match self.csd_version.as_deref() {
            Some(csd) if !csd.is_empty() => format!("{version} {csd}"),
            _ => version,
        }
    }

    /// Write a human-readable description of this `SystemInfo` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_SYSTEM_INFO
  processor_architecture                     = {:#x}
  processor_level                            = {}
  processor_revision                         = {:#x}
  number_of_processors                       = {}
  product_type                               = {}
  major_version                              = {}
  minor_version                              = {}
  build_number                               = {}
  platform_id                                = {:#x}
  csd_version_rva                            = {:#x}
  suite_mask                                 = {:#x}
  (os)                                       = {}
  (cpu)                                      = {}
  (version)                                  = {}
  (cpu_info)                                 = {}

",
            self.raw.processor_architecture,
            self.raw.processor_level,
            self.raw.processor_revision,
            self.raw.number_of_processors,
            self.raw.product_type,
            self.raw.major_version,
            self.raw.minor_version,
            self.raw.build_number,
            self.raw.platform_id,
            self.raw.csd_version_rva,
            self.raw.suite_mask,
            self.os.long_name(),
            self.cpu,
            self.os_version(),
            self.cpu_info.as_deref().unwrap_or(""),
        )
    }
}
