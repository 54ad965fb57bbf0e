// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Loaded and unloaded module lists.

use debugid::{CodeId, DebugId};
use minidump_format::format::{self as md, CvSignature, MINIDUMP_STREAM_TYPE};
use num_traits::FromPrimitive;
use range_map::RangeMap;
use scroll::ctx::SizeWith;
use scroll::Pread;
use std::borrow::Cow;
use std::io;
use std::io::prelude::*;
use std::iter;
use std::sync::Arc;
use uuid::Uuid;

use crate::cursor::ByteCursor;
use crate::error::DiagnosticKind;
use crate::streams::{
    optional_location, range_map, read_ex_list, read_list, DecodeContext, Diagnostics,
    StreamDecoder, StringTable,
};
use crate::strings::{bytes_to_hex, format_time_t, string_from_bytes_nul};
use crate::system_info::Os;

/// CodeView data describes how to locate debug symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeView<'a> {
    /// PDB 2.0 format data in a separate file.
    Pdb20(md::CV_INFO_PDB20<'a>),
    /// PDB 7.0 format data in a separate file (most common).
    Pdb70(md::CV_INFO_PDB70<'a>),
    /// Indicates data is in an ELF binary with build ID `build_id`.
    Elf(md::CV_INFO_ELF<'a>),
    /// An unknown format containing the given bytes of data.
    Unknown(&'a [u8]),
}

/// An executable or shared library loaded in the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module<'a> {
    /// The `MINIDUMP_MODULE` direct from the minidump file.
    pub raw: md::MINIDUMP_MODULE,
    /// The module name. Empty if the name string could not be decoded.
    ///
    /// Modules citing the same name string share it.
    pub name: Arc<str>,
    /// A `CodeView` record, if one is present. Borrows from the dump.
    pub codeview_info: Option<CodeView<'a>>,
    /// The operating system named by the system info stream, if it decoded.
    pub os: Option<Os>,
    debug_id: Option<DebugId>,
}

/// Decode a CodeView record, whose layout depends on its leading signature.
fn read_codeview(bytes: &[u8], endian: scroll::Endian) -> Result<CodeView<'_>, scroll::Error> {
    let signature: u32 = bytes.pread_with(0, endian)?;
    Ok(match CvSignature::from_u32(signature) {
        Some(CvSignature::Pdb70) => CodeView::Pdb70(bytes.pread_with(0, endian)?),
        Some(CvSignature::Pdb20) => CodeView::Pdb20(bytes.pread_with(0, endian)?),
        Some(CvSignature::Elf) => CodeView::Elf(bytes.pread_with(0, endian)?),
        _ => CodeView::Unknown(bytes),
    })
}

fn read_debug_id(codeview_info: &CodeView, endian: scroll::Endian) -> Option<DebugId> {
    match codeview_info {
        CodeView::Pdb70(raw) => {
            let uuid = Uuid::from_fields(
                raw.signature.data1,
                raw.signature.data2,
                raw.signature.data3,
                &raw.signature.data4,
            );
            (!uuid.is_nil()).then(|| DebugId::from_parts(uuid, raw.age))
        }
        CodeView::Pdb20(raw) => Some(DebugId::from_pdb20(raw.signature, raw.age)),
        CodeView::Elf(raw) => {
            // Mapped files that are not executables carry an all-zero build id.
            if raw.build_id.iter().all(|byte| *byte == 0) {
                return None;
            }
            // The first 16 bytes of the build id are read as a GUID, zero padded.
            let guid_size = md::GUID::size_with(&endian);
            let padded: Vec<u8> = raw
                .build_id
                .iter()
                .cloned()
                .chain(iter::repeat(0))
                .take(guid_size)
                .collect();
            padded
                .pread_with::<md::GUID>(0, endian)
                .ok()
                .map(|g| Uuid::from_fields(g.data1, g.data2, g.data3, &g.data4))
                .map(DebugId::from_uuid)
        }
        CodeView::Unknown(_) => None,
    }
}

impl<'a> Module<'a> {
    /// Create a `Module` with some basic info.
    ///
    /// Useful for testing.
    pub fn new(base: u64, size: u32, name: &str) -> Module<'a> {
        Module {
            raw: md::MINIDUMP_MODULE {
                base_of_image: base,
                size_of_image: size,
                ..md::MINIDUMP_MODULE::default()
            },
            name: Arc::from(name),
            codeview_info: None,
            os: None,
            debug_id: None,
        }
    }

    /// Resolve the name and CodeView record of `raw`.
    ///
    /// Returns `None` only when the record's address range is impossible.
    fn read(
        raw: md::MINIDUMP_MODULE,
        ctx: &DecodeContext<'a>,
        names: &mut StringTable,
        diag: &mut Diagnostics,
    ) -> Option<Module<'a>> {
        if raw
            .base_of_image
            .checked_add(raw.size_of_image as u64)
            .is_none()
        {
            diag.push(DiagnosticKind::InvalidField {
                detail: format!(
                    "module at {:#x} with size {:#x} overflows the address space",
                    raw.base_of_image, raw.size_of_image
                ),
            });
            return None;
        }

        let name = names.read(&ctx.dump, raw.module_name_rva as u64, diag);

        let codeview_info = match optional_location(&ctx.dump, &raw.cv_record) {
            None => None,
            Some(Err(e)) => {
                diag.push(e);
                None
            }
            Some(Ok(bytes)) => match read_codeview(bytes, ctx.endian()) {
                Ok(cv) => Some(cv),
                Err(e) => {
                    diag.push(DiagnosticKind::TruncatedStream {
                        detail: format!("CodeView record at {:#x}: {e}", raw.cv_record.rva),
                    });
                    None
                }
            },
        };
        let debug_id = codeview_info
            .as_ref()
            .and_then(|cv| read_debug_id(cv, ctx.endian()));

        Some(Module {
            raw,
            name,
            codeview_info,
            os: ctx.os,
            debug_id,
        })
    }

    pub fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    pub fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    /// The path of the module file.
    pub fn code_file(&self) -> Cow<'_, str> {
        Cow::Borrowed(&*self.name)
    }

    /// An identifier for the module binary, as symbol servers expect it.
    pub fn code_identifier(&self) -> Option<CodeId> {
        match self.codeview_info {
            // macOS writers reuse the PDB 7.0 record for the Mach-O UUID.
            Some(CodeView::Pdb70(ref raw)) if self.os == Some(Os::MacOs) => {
                let uuid = Uuid::from_fields(
                    raw.signature.data1,
                    raw.signature.data2,
                    raw.signature.data3,
                    &raw.signature.data4,
                );
                Some(CodeId::new(format!("{:X}", uuid.simple())))
            }
            Some(CodeView::Pdb20(_)) | Some(CodeView::Pdb70(_)) => Some(self.timestamp_size_id()),
            Some(CodeView::Elf(ref raw)) => {
                if raw.build_id.iter().all(|byte| *byte == 0) {
                    None
                } else {
                    Some(CodeId::from_binary(raw.build_id))
                }
            }
            None if self.os == Some(Os::Windows) => Some(self.timestamp_size_id()),
            _ => None,
        }
    }

    fn timestamp_size_id(&self) -> CodeId {
        CodeId::new(format!(
            "{0:08X}{1:x}",
            self.raw.time_date_stamp, self.raw.size_of_image
        ))
    }

    /// The file holding debug information for this module.
    pub fn debug_file(&self) -> Option<Cow<'_, str>> {
        match self.codeview_info {
            Some(CodeView::Pdb70(ref raw)) => string_from_bytes_nul(raw.pdb_file_name),
            Some(CodeView::Pdb20(ref raw)) => string_from_bytes_nul(raw.pdb_file_name),
            Some(CodeView::Elf(_)) => Some(Cow::Borrowed(&*self.name)),
            _ => None,
        }
    }

    pub fn debug_identifier(&self) -> Option<DebugId> {
        self.debug_id
    }

    /// The file version as "a.b.c.d", if the version resource is valid.
    pub fn version(&self) -> Option<Cow<'_, str>> {
        let info = &self.raw.version_info;
        if info.signature == md::VS_FFI_SIGNATURE && info.struct_version == md::VS_FFI_STRUCVERSION
        {
            Some(Cow::Owned(format!(
                "{}.{}.{}.{}",
                info.file_version_hi >> 16,
                info.file_version_hi & 0xffff,
                info.file_version_lo >> 16,
                info.file_version_lo & 0xffff
            )))
        } else {
            None
        }
    }

    /// The inclusive address range of the module, `None` for an empty module.
    pub fn memory_range(&self) -> Option<(u64, u64)> {
        if self.size() == 0 {
            return None;
        }
        Some((
            self.base_address(),
            self.base_address().checked_add(self.size())? - 1,
        ))
    }

    /// Write a human-readable description of this `Module` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_MODULE
  base_of_image                   = {:#x}
  size_of_image                   = {:#x}
  checksum                        = {:#x}
  time_date_stamp                 = {:#x} {}
  module_name_rva                 = {:#x}
  version_info.signature          = {:#x}
  version_info.struct_version     = {:#x}
  version_info.file_version       = {:#x}:{:#x}
  version_info.product_version    = {:#x}:{:#x}
  version_info.file_flags_mask    = {:#x}
  version_info.file_flags         = {:#x}
  version_info.file_os            = {:#x}
  version_info.file_type          = {:#x}
  version_info.file_subtype       = {:#x}
  version_info.file_date          = {:#x}:{:#x}
  cv_record.data_size             = {}
  cv_record.rva                   = {:#x}
  misc_record.data_size           = {}
  misc_record.rva                 = {:#x}
  (code_file)                     = \"{}\"
  (code_identifier)               = \"{}\"
",
            self.raw.base_of_image,
            self.raw.size_of_image,
            self.raw.checksum,
            self.raw.time_date_stamp,
            format_time_t(self.raw.time_date_stamp),
            self.raw.module_name_rva,
            self.raw.version_info.signature,
            self.raw.version_info.struct_version,
            self.raw.version_info.file_version_hi,
            self.raw.version_info.file_version_lo,
            self.raw.version_info.product_version_hi,
            self.raw.version_info.product_version_lo,
            self.raw.version_info.file_flags_mask,
            self.raw.version_info.file_flags,
            self.raw.version_info.file_os,
            self.raw.version_info.file_type,
            self.raw.version_info.file_subtype,
            self.raw.version_info.file_date_hi,
            self.raw.version_info.file_date_lo,
            self.raw.cv_record.data_size,
            self.raw.cv_record.rva,
            self.raw.misc_record.data_size,
            self.raw.misc_record.rva,
            self.code_file(),
            self.code_identifier().unwrap_or_default(),
        )?;
        match self.codeview_info {
            Some(CodeView::Pdb70(ref raw)) => {
                let pdb_file_name =
                    string_from_bytes_nul(raw.pdb_file_name).unwrap_or(Cow::Borrowed("(invalid)"));
                write!(f, "  (cv_record).cv_signature        = {:#x}
  (cv_record).signature           = {:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}
  (cv_record).age                 = {}
  (cv_record).pdb_file_name       = \"{}\"
",
                       raw.cv_signature,
                       raw.signature.data1,
                       raw.signature.data2,
                       raw.signature.data3,
                       raw.signature.data4[0],
                       raw.signature.data4[1],
                       raw.signature.data4[2],
                       raw.signature.data4[3],
                       raw.signature.data4[4],
                       raw.signature.data4[5],
                       raw.signature.data4[6],
                       raw.signature.data4[7],
                       raw.age,
                       pdb_file_name,
                )?;
            }
            Some(CodeView::Pdb20(ref raw)) => {
                let pdb_file_name =
                    string_from_bytes_nul(raw.pdb_file_name).unwrap_or(Cow::Borrowed("(invalid)"));
                write!(
                    f,
                    "  (cv_record).cv_header.signature = {:#x}
  (cv_record).cv_header.offset    = {:#x}
  (cv_record).signature           = {:#x} {}
  (cv_record).age                 = {}
  (cv_record).pdb_file_name       = \"{}\"
",
                    raw.cv_signature,
                    raw.cv_offset,
                    raw.signature,
                    format_time_t(raw.signature),
                    raw.age,
                    pdb_file_name,
                )?;
            }
            Some(CodeView::Elf(ref raw)) => {
                write!(
                    f,
                    "  (cv_record).cv_signature        = {:#x}
  (cv_record).build_id            = {}
",
                    raw.cv_signature,
                    bytes_to_hex(raw.build_id),
                )?;
            }
            Some(CodeView::Unknown(ref bytes)) => {
                writeln!(f, "  (cv_record)                     = {}", bytes_to_hex(bytes))?;
            }
            None => {
                writeln!(f, "  (cv_record)                     = (null)")?;
            }
        }
        write!(
            f,
            r#"  (debug_file)                    = "{}"
  (debug_identifier)              = "{}"
  (version)                       = "{}"

"#,
            self.debug_file().unwrap_or(Cow::Borrowed("")),
            self.debug_identifier().unwrap_or_default(),
            self.version().unwrap_or(Cow::Borrowed("")),
        )
    }
}

/// The modules loaded in the process, in load order.
#[derive(Clone, Debug)]
pub struct ModuleList<'a> {
    modules: Vec<Module<'a>>,
    /// Indices into `modules`, keyed by address range.
    modules_by_addr: RangeMap<u64, usize>,
}

impl PartialEq for ModuleList<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.modules == other.modules
    }
}

impl Eq for ModuleList<'_> {}

impl<'a> ModuleList<'a> {
    /// Return an empty `ModuleList`.
    pub fn new() -> ModuleList<'a> {
        ModuleList {
            modules: vec![],
            modules_by_addr: RangeMap::new(),
        }
    }

    /// Create a `ModuleList` from a list of `Module`s.
    pub fn from_modules(modules: Vec<Module<'a>>) -> ModuleList<'a> {
        let modules_by_addr = range_map(
            modules
                .iter()
                .enumerate()
                .map(|(i, module)| (module.memory_range(), i)),
        );
        ModuleList {
            modules,
            modules_by_addr,
        }
    }

    /// Returns the module corresponding to the main executable, the first in the list.
    pub fn main_module(&self) -> Option<&Module<'a>> {
        self.modules.first()
    }

    /// Return a `Module` whose address range covers `address`.
    pub fn module_at_address(&self, address: u64) -> Option<&Module<'a>> {
        self.modules_by_addr
            .get(address)
            .map(|&index| &self.modules[index])
    }

    /// Iterate over the modules in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Module<'a>> {
        self.modules.iter()
    }

    /// Iterate over the modules in order by memory address.
    pub fn by_addr(&self) -> impl DoubleEndedIterator<Item = &Module<'a>> {
        self.modules_by_addr
            .ranges_values()
            .map(move |&(_, index)| &self.modules[index])
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Write a human-readable description of this `ModuleList` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MinidumpModuleList
  module_count = {}

",
            self.modules.len()
        )?;
        for (i, module) in self.modules.iter().enumerate() {
            writeln!(f, "module[{i}]")?;
            module.print(f)?;
        }
        Ok(())
    }
}

impl Default for ModuleList<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> StreamDecoder<'a> for ModuleList<'a> {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::ModuleListStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<ModuleList<'a>> {
        let raw_modules: Vec<md::MINIDUMP_MODULE> = read_list(&payload, ctx, diag)?;
        let mut names = StringTable::new();
        let modules = raw_modules
            .into_iter()
            .filter_map(|raw| Module::read(raw, ctx, &mut names, diag))
            .collect();
        Some(ModuleList::from_modules(modules))
    }
}

/// A module that was unloaded before the dump was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnloadedModule {
    /// The `MINIDUMP_UNLOADED_MODULE` direct from the minidump file.
    pub raw: md::MINIDUMP_UNLOADED_MODULE,
    /// The module name. Empty if the name string could not be decoded.
    pub name: Arc<str>,
}

impl UnloadedModule {
    pub fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    pub fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    pub fn code_file(&self) -> Cow<'_, str> {
        Cow::Borrowed(&*self.name)
    }

    pub fn code_identifier(&self) -> CodeId {
        CodeId::new(format!(
            "{0:08X}{1:x}",
            self.raw.time_date_stamp, self.raw.size_of_image
        ))
    }

    /// Whether `address` falls inside the range the module used to occupy.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base_address() && address - self.base_address() < self.size()
    }

    /// Write a human-readable description of this `UnloadedModule` to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_UNLOADED_MODULE
  base_of_image                   = {:#x}
  size_of_image                   = {:#x}
  checksum                        = {:#x}
  time_date_stamp                 = {:#x} {}
  module_name_rva                 = {:#x}
  (code_file)                     = \"{}\"
  (code_identifier)               = \"{}\"

",
            self.raw.base_of_image,
            self.raw.size_of_image,
            self.raw.checksum,
            self.raw.time_date_stamp,
            format_time_t(self.raw.time_date_stamp),
            self.raw.module_name_rva,
            self.code_file(),
            self.code_identifier(),
        )
    }
}

/// Modules unloaded before the dump was written, in stream order.
///
/// Unloaded modules may overlap each other and the loaded modules, so there is no
/// address map; [`UnloadedModuleList::modules_at_address`] scans.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnloadedModuleList {
    pub modules: Vec<UnloadedModule>,
}

impl UnloadedModuleList {
    pub fn modules_at_address(&self, address: u64) -> impl Iterator<Item = &UnloadedModule> {
        self.modules.iter().filter(move |m| m.contains(address))
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnloadedModule> {
        self.modules.iter()
    }

    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MinidumpUnloadedModuleList
  module_count = {}

",
            self.modules.len()
        )?;
        for (i, module) in self.modules.iter().enumerate() {
            writeln!(f, "module[{i}]")?;
            module.print(f)?;
        }
        Ok(())
    }
}

impl<'a> StreamDecoder<'a> for UnloadedModuleList {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::UnloadedModuleListStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<UnloadedModuleList> {
        let raw_modules: Vec<md::MINIDUMP_UNLOADED_MODULE> = read_ex_list(&payload, ctx, diag)?;
        let mut names = StringTable::new();
        let modules = raw_modules
            .into_iter()
            .map(|raw| {
                let name = names.read(&ctx.dump, raw.module_name_rva as u64, diag);
                UnloadedModule { raw, name }
            })
            .collect();
        Some(UnloadedModuleList { modules })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse;
    use minidump_synth::{
        cv_elf, cv_pdb20, cv_pdb70, DumpString, Module as SynthModule, SimpleStream,
        SynthMinidump, SystemInfo as SynthSystemInfo, UnloadedModule as SynthUnloadedModule,
    };
    use test_assembler::{Endian, Section};

    const GUID: md::GUID = md::GUID {
        data1: 0xabcd1234,
        data2: 0xf00d,
        data3: 0xbeef,
        data4: [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
    };

    #[test]
    fn test_module_list() {
        let name1 = DumpString::new("single module", Endian::Little);
        let name2 = DumpString::new("another module", Endian::Little);
        let cv = cv_pdb70(Endian::Little, GUID, 1, "c:\\foo\\file.pdb");
        let module1 = SynthModule::new(
            Endian::Little,
            0xa90206ca83eb2852,
            0xada542bd,
            &name1,
            0xb1054d2a,
            0x34571371,
            None,
        )
        .cv_record(&cv);
        let module2 = SynthModule::new(
            Endian::Little,
            0x1000,
            0x2000,
            &name2,
            0x12345678,
            0,
            None,
        );
        let dump = SynthMinidump::new()
            .add_module(module1)
            .add_module(module2)
            .add(name1)
            .add(name2)
            .add(cv)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());
        let modules = report.modules.unwrap();
        assert_eq!(modules.len(), 2);
        let module = modules.main_module().unwrap();
        assert_eq!(module.code_file(), "single module");
        assert_eq!(module.base_address(), 0xa90206ca83eb2852);
        assert_eq!(module.size(), 0xada542bd);
        assert_eq!(
            module.code_identifier().unwrap(),
            CodeId::new("B1054D2Aada542bd".to_string())
        );
        assert_eq!(module.debug_file().unwrap(), "c:\\foo\\file.pdb");
        assert_eq!(
            module.debug_identifier().unwrap(),
            "ABCD1234F00DBEEF01020304050607081".parse().unwrap()
        );
        assert_eq!(module.version().unwrap(), "4369.4369.8738.8738");

        assert_eq!(
            modules.module_at_address(0x1fff).unwrap().code_file(),
            "another module"
        );
        assert!(modules.module_at_address(0x3000).is_none());
        let by_addr: Vec<_> = modules.by_addr().map(|m| m.base_address()).collect();
        assert_eq!(by_addr, vec![0x1000, 0xa90206ca83eb2852]);
    }

    #[test]
    fn test_pdb20_and_elf_codeview() {
        let name1 = DumpString::new("old.dll", Endian::Little);
        let name2 = DumpString::new("libfoo.so", Endian::Little);
        let cv1 = cv_pdb20(Endian::Little, 0x12345678, 2, "old.pdb");
        let build_id = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa];
        let cv2 = cv_elf(Endian::Little, &build_id);
        let dump = SynthMinidump::new()
            .add_module(SynthModule::new(Endian::Little, 0x1000, 0x1000, &name1, 0, 0, None).cv_record(&cv1))
            .add_module(SynthModule::new(Endian::Little, 0x4000, 0x1000, &name2, 0, 0, None).cv_record(&cv2))
            .add(name1)
            .add(name2)
            .add(cv1)
            .add(cv2)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let modules = report.modules.unwrap();
        let pdb20 = modules.module_at_address(0x1000).unwrap();
        assert_eq!(pdb20.debug_file().unwrap(), "old.pdb");
        assert_eq!(
            pdb20.debug_identifier(),
            Some(DebugId::from_pdb20(0x12345678, 2))
        );

        let elf = modules.module_at_address(0x4000).unwrap();
        assert_eq!(elf.debug_file().unwrap(), "libfoo.so");
        assert_eq!(
            elf.code_identifier().unwrap(),
            CodeId::new("112233445566778899aa".to_string())
        );
        assert_eq!(
            elf.debug_identifier().unwrap(),
            "443322116655887799aa000000000000".parse().unwrap()
        );
    }

    #[test]
    fn test_macos_code_identifier() {
        let name = DumpString::new("/usr/lib/libSystem.dylib", Endian::Little);
        let cv = cv_pdb70(Endian::Little, GUID, 0, "libSystem.dylib");
        let dump = SynthMinidump::new()
            .add_system_info(
                SynthSystemInfo::new(Endian::Little)
                    .set_platform_id(md::PlatformId::MacOs as u32),
            )
            .add_module(SynthModule::new(Endian::Little, 0x1000, 0x1000, &name, 0, 0, None).cv_record(&cv))
            .add(name)
            .add(cv)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let modules = report.modules.unwrap();
        let module = modules.main_module().unwrap();
        assert_eq!(module.os, Some(Os::MacOs));
        assert_eq!(
            module.code_identifier().unwrap(),
            CodeId::new("ABCD1234F00DBEEF0102030405060708".to_string())
        );
    }

    #[test]
    fn test_bad_name_and_overflowing_module() {
        let good = DumpString::new("good", Endian::Little);
        // Odd byte length.
        let bad = DumpString::with_length(3, &[0x41, 0, 0x42], Endian::Little);
        let dump = SynthMinidump::new()
            .add_module(SynthModule::new(Endian::Little, 0x1000, 0x1000, &bad, 0, 0, None))
            .add_module(SynthModule::new(
                Endian::Little,
                u64::MAX - 0x10,
                0x1000,
                &good,
                0,
                0,
                None,
            ))
            .add(good)
            .add(bad)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let modules = report.modules.unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(&*modules.main_module().unwrap().name, "");
        let kinds: Vec<_> = report.diagnostics.iter().map(|d| d.kind.name()).collect();
        assert_eq!(kinds, vec!["MalformedString", "InvalidField"]);
        assert!(report
            .diagnostics
            .iter()
            .all(|d| d.stream_type == ModuleList::STREAM_TYPE));
    }

    #[test]
    fn test_codeview_out_of_bounds() {
        let name = DumpString::new("module", Endian::Little);
        let cv = Section::new();
        cv.start().set_const(0x7fff_0000);
        cv.final_size().set_const(100);
        let dump = SynthMinidump::new()
            .add_module(SynthModule::new(Endian::Little, 0x1000, 0x1000, &name, 0, 0, None).cv_record(&cv))
            .add(name)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let modules = report.modules.unwrap();
        assert_eq!(modules.main_module().unwrap().codeview_info, None);
        assert_eq!(report.diagnostics[0].kind.name(), "TruncatedStream");
    }

    #[test]
    fn test_unknown_codeview() {
        let name = DumpString::new("module", Endian::Little);
        let cv = Section::new().D32(0x3131424e).D32(0x1234);
        let dump = SynthMinidump::new()
            .add_module(SynthModule::new(Endian::Little, 0x1000, 0x1000, &name, 0, 0, None).cv_record(&cv))
            .add(name)
            .add(cv)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let modules = report.modules.unwrap();
        let module = modules.main_module().unwrap();
        assert_eq!(
            module.codeview_info,
            Some(CodeView::Unknown(&[0x4e, 0x42, 0x31, 0x31, 0x34, 0x12, 0, 0][..]))
        );
        assert_eq!(module.debug_identifier(), None);
        assert_eq!(module.code_identifier(), None);
    }

    #[test]
    fn test_modules_share_cited_data() {
        let name = DumpString::new("c:\\windows\\shared.dll", Endian::Little);
        let cv = Section::new().D32(0x3131424e).append_repeated(0xab, 4096);
        let mut dump = SynthMinidump::new();
        for i in 0..200u64 {
            let module =
                SynthModule::new(Endian::Little, 0x10000 * (i + 1), 0x1000, &name, 0, 0, None)
                    .cv_record(&cv);
            dump = dump.add_module(module);
        }
        let dump = dump.add(name).add(cv).finish().unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());
        let modules = report.modules.as_ref().unwrap();
        assert_eq!(modules.len(), 200);

        let first = modules.main_module().unwrap();
        let Some(CodeView::Unknown(first_cv)) = first.codeview_info else {
            panic!("expected an unknown CodeView record");
        };
        assert_eq!(first_cv.len(), 4100);
        let dump_range = dump.as_ptr_range();
        assert!(dump_range.contains(&first_cv.as_ptr()));
        for module in modules.iter() {
            assert!(Arc::ptr_eq(&module.name, &first.name));
            match module.codeview_info {
                Some(CodeView::Unknown(bytes)) => assert_eq!(bytes.as_ptr(), first_cv.as_ptr()),
                ref other => panic!("unexpected CodeView {other:?}"),
            }
        }
    }

    #[test]
    fn test_unloaded_modules() {
        let name = DumpString::new("gone.dll", Endian::Little);
        let dump = SynthMinidump::new()
            .add_unloaded_module(SynthUnloadedModule::new(
                Endian::Little,
                0x10000,
                0x1000,
                &name,
                0xb1054d2a,
                0,
            ))
            .add(name)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        let unloaded = report.unloaded_modules.unwrap();
        assert_eq!(unloaded.modules.len(), 1);
        assert_eq!(unloaded.modules[0].code_file(), "gone.dll");
        assert_eq!(
            unloaded.modules[0].code_identifier(),
            CodeId::new("B1054D2A1000".to_string())
        );
        assert_eq!(unloaded.modules_at_address(0x10fff).count(), 1);
        assert_eq!(unloaded.modules_at_address(0x11000).count(), 0);
    }

    #[test]
    fn test_module_list_partial() {
        let name = DumpString::new("module", Endian::Little);
        let list = SimpleStream {
            stream_type: ModuleList::STREAM_TYPE,
            section: Section::new().D32(5),
        };
        let dump = SynthMinidump::new()
            .add_stream(list)
            .add(name)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.modules.unwrap().is_empty());
        assert_eq!(
            report.diagnostics[0].kind,
            DiagnosticKind::PartialStream {
                recovered: 0,
                declared: 5
            }
        );
    }

    #[test]
    fn test_print() {
        let mut module = Module::new(0x1000, 0x100, "test.dll");
        module.os = Some(Os::Windows);
        let mut out = Vec::new();
        module.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(code_file)                     = \"test.dll\""));
        assert!(text.contains("(cv_record)                     = (null)"));
        assert!(text.contains("(code_identifier)               = \"00000000100\""));
    }
}
