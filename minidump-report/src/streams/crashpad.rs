// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Crashpad's annotation stream: report and client ids, and key/value annotations for the
//! process and for individual modules.

use minidump_format::format::{self as md, MINIDUMP_STREAM_TYPE};
use scroll::ctx::{SizeWith, TryFromCtx};
use scroll::Endian;
use std::collections::BTreeMap;
use std::io;
use std::io::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::cursor::ByteCursor;
use crate::error::DiagnosticKind;
use crate::streams::{
    finish_list, read_entries, DecodeContext, Diagnostics, StreamDecoder, StringTable,
};
use crate::strings::{read_utf8_string, read_utf8_unterminated};

/// A typed annotation object registered by a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    /// Declared with the invalid type code.
    Invalid,
    String(Arc<str>),
    /// An application-defined type; the value is left undecoded.
    UserDefined(md::MINIDUMP_ANNOTATION),
    /// A type code Crashpad reserves but does not define.
    Unsupported(md::MINIDUMP_ANNOTATION),
}

/// Annotations one module registered with Crashpad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleCrashpadInfo {
    pub raw: md::MINIDUMP_MODULE_CRASHPAD_INFO,
    /// Index of the module in the module list.
    pub module_index: usize,
    pub list_annotations: Vec<Arc<str>>,
    pub simple_annotations: BTreeMap<Arc<str>, Arc<str>>,
    pub annotation_objects: BTreeMap<Arc<str>, Annotation>,
}

/// Additional Crashpad-specific information carried within a minidump file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrashpadInfo {
    pub raw: md::MINIDUMP_CRASHPAD_INFO,
    pub simple_annotations: BTreeMap<Arc<str>, Arc<str>>,
    pub module_list: Vec<ModuleCrashpadInfo>,
}

/// Hyphenated lower-case rendering of a GUID.
pub fn guid_string(guid: &md::GUID) -> String {
    Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4).to_string()
}

impl CrashpadInfo {
    pub fn report_id(&self) -> String {
        guid_string(&self.raw.report_id)
    }

    pub fn client_id(&self) -> String {
        guid_string(&self.raw.client_id)
    }

    /// Write a human-readable description of this `CrashpadInfo` to `f`.
    ///
    /// This is very verbose, it is the format used by `minidump_dump`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        write!(
            f,
            "MDRawCrashpadInfo
  version = {}
  report_id = {}
  client_id = {}
",
            self.raw.version,
            self.report_id(),
            self.client_id(),
        )?;

        for (name, value) in &self.simple_annotations {
            writeln!(f, "  simple_annotations[\"{name}\"] = {value}")?;
        }

        for (index, module) in self.module_list.iter().enumerate() {
            writeln!(
                f,
                "  module_list[{}].minidump_module_list_index = {}",
                index, module.module_index,
            )?;
            writeln!(f, "  module_list[{}].version = {}", index, module.raw.version)?;
            for (i, annotation) in module.list_annotations.iter().enumerate() {
                writeln!(f, "  module_list[{index}].list_annotations[{i}] = {annotation}")?;
            }
            for (name, value) in &module.simple_annotations {
                writeln!(f, "  module_list[{index}].simple_annotations[\"{name}\"] = {value}")?;
            }
            for (name, value) in &module.annotation_objects {
                write!(f, "  module_list[{index}].annotation_objects[\"{name}\"] = ")?;
                match value {
                    Annotation::Invalid => writeln!(f, "<invalid>"),
                    Annotation::String(string) => writeln!(f, "{string}"),
                    Annotation::UserDefined(_) => writeln!(f, "<user defined>"),
                    Annotation::Unsupported(_) => writeln!(f, "<unsupported>"),
                }?;
            }
        }

        writeln!(f)
    }
}

/// The strings of one Crashpad stream, shared by RVA.
struct Strings {
    terminated: StringTable,
    unterminated: StringTable,
}

impl Strings {
    fn new() -> Strings {
        Strings {
            terminated: StringTable::with_reader(read_utf8_string),
            unterminated: StringTable::with_reader(read_utf8_unterminated),
        }
    }
}

/// Read the counted array at `location`, keeping the entries that fit.
///
/// An empty location is an empty array.
fn read_counted<'a, T>(
    what: &str,
    location: &md::MINIDUMP_LOCATION_DESCRIPTOR,
    ctx: &DecodeContext<'a>,
    diag: &mut Diagnostics,
) -> Vec<T>
where
    T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
    T: SizeWith<Endian>,
{
    if location.data_size == 0 {
        return Vec::new();
    }
    let data = match ctx.dump.location(location) {
        Ok(bytes) => ctx.dump.with_bytes(bytes),
        Err(e) => {
            diag.push(DiagnosticKind::TruncatedStream {
                detail: format!("{what}: {e}"),
            });
            return Vec::new();
        }
    };
    let declared = match data.read_u32(0) {
        Ok(count) => count as u64,
        Err(e) => {
            diag.push(DiagnosticKind::TruncatedStream {
                detail: format!("{what}: {e}"),
            });
            return Vec::new();
        }
    };
    let entry_size = T::size_with(&ctx.endian()) as u64;
    let entries = read_entries(&data, 4, entry_size, entry_size, declared);
    finish_list(entries, declared, ctx, diag).unwrap_or_default()
}

fn read_dictionary(
    location: &md::MINIDUMP_LOCATION_DESCRIPTOR,
    ctx: &DecodeContext<'_>,
    strings: &mut Strings,
    diag: &mut Diagnostics,
) -> BTreeMap<Arc<str>, Arc<str>> {
    let entries: Vec<md::MINIDUMP_SIMPLE_STRING_DICTIONARY_ENTRY> =
        read_counted("simple_annotations", location, ctx, diag);
    let mut dictionary = BTreeMap::new();
    for entry in entries {
        let key = strings.terminated.try_read(&ctx.dump, entry.key as u64);
        let value = strings.terminated.try_read(&ctx.dump, entry.value as u64);
        match (key, value) {
            (Ok(key), Ok(value)) => {
                dictionary.insert(key, value);
            }
            (Err(e), _) | (_, Err(e)) => diag.push(e),
        }
    }
    dictionary
}

fn read_string_list(
    location: &md::MINIDUMP_LOCATION_DESCRIPTOR,
    ctx: &DecodeContext<'_>,
    strings: &mut Strings,
    diag: &mut Diagnostics,
) -> Vec<Arc<str>> {
    let rvas: Vec<u32> = read_counted("list_annotations", location, ctx, diag);
    rvas.into_iter()
        .filter_map(|rva| {
            strings
                .terminated
                .try_read(&ctx.dump, rva as u64)
                .map_err(|e| diag.push(e))
                .ok()
        })
        .collect()
}

fn read_annotation_objects(
    location: &md::MINIDUMP_LOCATION_DESCRIPTOR,
    ctx: &DecodeContext<'_>,
    strings: &mut Strings,
    diag: &mut Diagnostics,
) -> BTreeMap<Arc<str>, Annotation> {
    let raws: Vec<md::MINIDUMP_ANNOTATION> =
        read_counted("annotation_objects", location, ctx, diag);
    let mut objects = BTreeMap::new();
    for raw in raws {
        let name = match strings.terminated.try_read(&ctx.dump, raw.name as u64) {
            Ok(name) => name,
            Err(e) => {
                diag.push(e);
                continue;
            }
        };
        let value = match raw.ty {
            md::MINIDUMP_ANNOTATION::TYPE_INVALID => Annotation::Invalid,
            md::MINIDUMP_ANNOTATION::TYPE_STRING => {
                match strings.unterminated.try_read(&ctx.dump, raw.value as u64) {
                    Ok(string) => Annotation::String(string),
                    Err(e) => {
                        diag.push(e);
                        continue;
                    }
                }
            }
            ty if ty >= md::MINIDUMP_ANNOTATION::TYPE_USER_DEFINED => Annotation::UserDefined(raw),
            _ => Annotation::Unsupported(raw),
        };
        objects.insert(name, value);
    }
    objects
}

impl ModuleCrashpadInfo {
    fn read(
        index: usize,
        link: &md::MINIDUMP_MODULE_CRASHPAD_INFO_LINK,
        ctx: &DecodeContext<'_>,
        strings: &mut Strings,
        diag: &mut Diagnostics,
    ) -> Option<ModuleCrashpadInfo> {
        let raw: md::MINIDUMP_MODULE_CRASHPAD_INFO =
            match ctx.dump.read_fixed_struct(link.location.rva as u64) {
                Ok(raw) => raw,
                Err(e) => {
                    diag.push(DiagnosticKind::TruncatedStream {
                        detail: format!("module_list[{index}]: {e}"),
                    });
                    return None;
                }
            };
        let list_annotations = read_string_list(&raw.list_annotations, ctx, strings, diag);
        let simple_annotations = read_dictionary(&raw.simple_annotations, ctx, strings, diag);
        let annotation_objects =
            read_annotation_objects(&raw.annotation_objects, ctx, strings, diag);
        Some(ModuleCrashpadInfo {
            raw,
            module_index: link.minidump_module_list_index as usize,
            list_annotations,
            simple_annotations,
            annotation_objects,
        })
    }
}

impl<'a> StreamDecoder<'a> for CrashpadInfo {
    const STREAM_TYPE: u32 = MINIDUMP_STREAM_TYPE::CrashpadInfoStream as u32;

    fn decode(
        payload: ByteCursor<'a>,
        ctx: &DecodeContext<'a>,
        diag: &mut Diagnostics,
    ) -> Option<CrashpadInfo> {
        let raw: md::MINIDUMP_CRASHPAD_INFO = match payload.read_fixed_struct(0) {
            Ok(raw) => raw,
            Err(e) => {
                diag.push(e);
                return None;
            }
        };
        // All later versions are compatible with version 1.
        if raw.version == 0 {
            diag.push(DiagnosticKind::InvalidField {
                detail: "crashpad info version 0".to_owned(),
            });
            return None;
        }

        let mut strings = Strings::new();
        let simple_annotations = read_dictionary(&raw.simple_annotations, ctx, &mut strings, diag);
        let links: Vec<md::MINIDUMP_MODULE_CRASHPAD_INFO_LINK> =
            read_counted("module_list", &raw.module_list, ctx, diag);
        let module_list = links
            .iter()
            .enumerate()
            .filter_map(|(index, link)| {
                ModuleCrashpadInfo::read(index, link, ctx, &mut strings, diag)
            })
            .collect();
        Some(CrashpadInfo {
            raw,
            simple_annotations,
            module_list,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse;
    use minidump_synth::{
        AnnotationValue, CrashpadInfo as SynthCrashpadInfo, DumpSection, DumpUtf8String,
        ModuleCrashpadInfo as SynthModuleCrashpadInfo, SectionExtra, SimpleStream, SynthMinidump,
    };
    use test_assembler::{Endian, Section};

    #[test]
    fn test_crashpad_info_missing() {
        let dump = SynthMinidump::new().finish().unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.crashpad_info.is_none());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_crashpad_info_ids() {
        let report_id = md::GUID {
            data1: 1,
            data2: 2,
            data3: 3,
            data4: [4, 5, 6, 7, 8, 9, 10, 11],
        };
        let client_id = md::GUID {
            data1: 11,
            data2: 10,
            data3: 9,
            data4: [8, 7, 6, 5, 4, 3, 2, 1],
        };
        let info = SynthCrashpadInfo::new(Endian::Big)
            .report_id(report_id)
            .client_id(client_id);
        let dump = SynthMinidump::with_endian(Endian::Big)
            .add_crashpad_info(info)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());

        let info = report.crashpad_info.unwrap();
        assert_eq!(info.raw.version, 1);
        assert_eq!(info.raw.report_id, report_id);
        assert_eq!(info.raw.client_id, client_id);
        assert_eq!(info.report_id(), "00000001-0002-0003-0405-060708090a0b");
        assert!(info.simple_annotations.is_empty());
        assert!(info.module_list.is_empty());
    }

    #[test]
    fn test_crashpad_info_annotations() {
        let module = SynthModuleCrashpadInfo::new(42, Endian::Little)
            .add_list_annotation("annotation")
            .add_simple_annotation("simple", "module")
            .add_annotation_object("string", AnnotationValue::String("value".to_owned()))
            .add_annotation_object("invalid", AnnotationValue::Invalid)
            .add_annotation_object("custom", AnnotationValue::Custom(0x8001, vec![42]))
            .add_annotation_object("reserved", AnnotationValue::Custom(7, vec![]));
        let info = SynthCrashpadInfo::new(Endian::Little)
            .add_module(module)
            .add_simple_annotation("simple", "info")
            .add_simple_annotation("channel", "beta");
        let dump = SynthMinidump::new()
            .add_crashpad_info(info)
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());

        let info = report.crashpad_info.unwrap();
        assert_eq!(&*info.simple_annotations["simple"], "info");
        assert_eq!(&*info.simple_annotations["channel"], "beta");
        assert_eq!(info.module_list.len(), 1);

        let module = &info.module_list[0];
        assert_eq!(module.module_index, 42);
        assert_eq!(module.raw.version, 1);
        assert_eq!(module.list_annotations, vec![Arc::from("annotation")]);
        assert_eq!(&*module.simple_annotations["simple"], "module");
        assert_eq!(
            module.annotation_objects["string"],
            Annotation::String(Arc::from("value"))
        );
        assert_eq!(module.annotation_objects["invalid"], Annotation::Invalid);
        assert!(matches!(
            module.annotation_objects["custom"],
            Annotation::UserDefined(md::MINIDUMP_ANNOTATION { ty: 0x8001, .. })
        ));
        assert!(matches!(
            module.annotation_objects["reserved"],
            Annotation::Unsupported(md::MINIDUMP_ANNOTATION { ty: 7, .. })
        ));

        let mut out = Vec::new();
        info.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("MDRawCrashpadInfo\n  version = 1\n"));
        assert!(text.contains("  simple_annotations[\"channel\"] = beta\n"));
        assert!(text.contains("  module_list[0].minidump_module_list_index = 42\n"));
        assert!(text.contains("  module_list[0].list_annotations[0] = annotation\n"));
        assert!(text.contains("  module_list[0].annotation_objects[\"custom\"] = <user defined>\n"));
    }

    #[test]
    fn test_crashpad_info_version_zero() {
        let dump = SynthMinidump::new()
            .add_crashpad_info(SynthCrashpadInfo::new(Endian::Little).version(0))
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.crashpad_info.is_none());
        assert_eq!(
            report.diagnostics[0].kind,
            DiagnosticKind::InvalidField {
                detail: "crashpad info version 0".to_owned()
            }
        );
    }

    #[test]
    fn test_crashpad_info_bad_references() {
        // The dictionary cites a key past the end of the dump; the module link cites a
        // record that is cut short.
        let good_key = DumpUtf8String::new("ok", Endian::Little);
        let good_value = DumpUtf8String::new("yes", Endian::Little);
        let dictionary = Section::with_endian(Endian::Little)
            .D32(3) // one more than present
            .D32(good_key.file_offset())
            .D32(good_value.file_offset())
            .D32(0xffff_0000)
            .D32(good_value.file_offset());
        let links = Section::with_endian(Endian::Little)
            .D32(1)
            .D32(0)
            .D32(28)
            .D32(0xffff_ff00);
        let stream = Section::with_endian(Endian::Little)
            .D32(1)
            .append_repeated(0, 32)
            .cite_location(&dictionary)
            .cite_location(&links);
        let dump = SynthMinidump::new()
            .add(good_key)
            .add(good_value)
            .add(dictionary)
            .add(links)
            .add_stream(SimpleStream {
                stream_type: CrashpadInfo::STREAM_TYPE,
                section: stream,
            })
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();

        let info = report.crashpad_info.as_ref().unwrap();
        assert_eq!(info.simple_annotations.len(), 1);
        assert_eq!(&*info.simple_annotations["ok"], "yes");
        assert!(info.module_list.is_empty());

        let kinds: Vec<_> = report.diagnostics.iter().map(|d| d.kind.name()).collect();
        assert_eq!(
            kinds,
            vec!["PartialStream", "TruncatedString", "TruncatedStream"]
        );
        assert_eq!(
            report.diagnostics[0].kind,
            DiagnosticKind::PartialStream {
                recovered: 2,
                declared: 3
            }
        );
        assert!(report
            .diagnostics
            .iter()
            .all(|d| d.stream_type == CrashpadInfo::STREAM_TYPE));
    }

    #[test]
    fn test_crashpad_annotations_share_cited_strings() {
        // Every entry of a module's string list cites the same string.
        let value = DumpUtf8String::new(&"x".repeat(4096), Endian::Little);
        let mut list = Section::with_endian(Endian::Little).D32(500);
        for _ in 0..500 {
            list = list.D32(value.file_offset());
        }
        let module_info = Section::with_endian(Endian::Little)
            .D32(1)
            .cite_location(&list)
            .D32(0)
            .D32(0)
            .D32(0)
            .D32(0);
        let links = Section::with_endian(Endian::Little)
            .D32(1)
            .D32(0)
            .cite_location(&module_info);
        let stream = Section::with_endian(Endian::Little)
            .D32(1)
            .append_repeated(0, 32)
            .D32(0)
            .D32(0)
            .cite_location(&links);
        let dump = SynthMinidump::new()
            .add(value)
            .add(list)
            .add(module_info)
            .add(links)
            .add_stream(SimpleStream {
                stream_type: CrashpadInfo::STREAM_TYPE,
                section: stream,
            })
            .finish()
            .unwrap();
        let report = parse(&dump).unwrap();
        assert!(report.diagnostics.is_empty());

        let annotations = &report.crashpad_info.as_ref().unwrap().module_list[0].list_annotations;
        assert_eq!(annotations.len(), 500);
        assert_eq!(annotations[0].len(), 4096);
        assert!(annotations
            .iter()
            .all(|annotation| Arc::ptr_eq(annotation, &annotations[0])));
    }
}
