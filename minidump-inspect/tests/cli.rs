// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

// `cargo test` for an application adds our binary to the env as `CARGO_BIN_EXE_<name>`.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use minidump_report::format as md;
use minidump_synth::{DumpString, Module, SimpleStream, SynthMinidump, SystemInfo};
use test_assembler::{Endian, Section};

fn write_dump(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn sample_dump() -> Vec<u8> {
    let name = DumpString::new("/usr/lib/libc.so.6", Endian::Little);
    let module = Module::new(Endian::Little, 0x7f00_0000_0000, 0x20000, &name, 0, 0, None);
    SynthMinidump::new()
        .add_system_info(
            SystemInfo::new(Endian::Little)
                .set_processor_architecture(
                    md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_ARM64 as u16,
                )
                .set_platform_id(md::PlatformId::Linux as u32),
        )
        .add_module(module)
        .add(name)
        .add_linux_stream(md::MINIDUMP_STREAM_TYPE::LinuxCmdLine, b"/bin/app\0-x\0")
        .add_stream(SimpleStream {
            stream_type: 0x4d7a_0042,
            section: Section::new().append_bytes(&[0xca, 0xfe]),
        })
        .finish()
        .unwrap()
}

fn damaged_dump() -> Vec<u8> {
    SynthMinidump::new()
        .add_raw_directory_entry(
            md::MINIDUMP_STREAM_TYPE::ModuleListStream as u32,
            0x100,
            0x00ff_ffff,
        )
        .finish()
        .unwrap()
}

fn run(args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_minidump-inspect");
    Command::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap()
}

#[test]
fn test_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dump(dir.path(), "sample.dmp", &sample_dump());
    let output = run(&[path.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("MDRawHeader"));
    assert!(stdout.contains("/usr/lib/libc.so.6"));
    assert!(stdout.contains("Stream LinuxCmdLine:\n/bin/app\\0\n-x\\0\n"));
}

#[test]
fn test_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dump(dir.path(), "sample.dmp", &sample_dump());
    let output = run(&["--json", path.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("{\""));
    assert!(stdout.contains("\"cpu_arch\":\"arm64\""));
    assert!(stdout.contains("\"linux_streams\":[\"LinuxCmdLine\"]"));
}

#[test]
fn test_raw() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dump(dir.path(), "sample.dmp", &sample_dump());
    let output = run(&["--raw", path.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("Stream LinuxCmdLine:\n"));
    assert!(stdout.contains("(Mozilla Extension), 2 bytes\n  cafe\n"));
    assert!(!stdout.contains("MDRawHeader"));
}

#[test]
fn test_stdin_and_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("report.json");
    let bin = env!("CARGO_BIN_EXE_minidump-inspect");
    let mut child = Command::new(bin)
        .args(["--json", "--pretty", "--output-file"])
        .arg(&out_path)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&sample_dump())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let written = std::fs::read_to_string(out_path).unwrap();
    assert!(written.starts_with("{\n  \""));
}

#[test]
fn test_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dump(dir.path(), "garbage.dmp", b"this is not a minidump at all, honest");
    let output = run(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("is not a readable minidump"));
}

#[test]
fn test_strict() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dump(dir.path(), "damaged.dmp", &damaged_dump());
    let output = run(&[path.to_str().unwrap()]);
    assert!(output.status.success());

    let output = run(&["--strict", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("ModuleListStream (directory entry 0): stream is truncated"));

    let clean = write_dump(dir.path(), "sample.dmp", &sample_dump());
    let output = run(&["--strict", clean.to_str().unwrap()]);
    assert!(output.status.success());
}

#[test]
fn test_conflicting_formats() {
    let output = run(&["--json", "--raw", "whatever.dmp"]);
    assert!(!output.status.success());
}
