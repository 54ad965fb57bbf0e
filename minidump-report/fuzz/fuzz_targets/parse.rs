#![no_main]
use libfuzzer_sys::fuzz_target;

use minidump_report::{parse_with_options, DuplicatePolicy, ParseOptions};

fuzz_target!(|data: &[u8]| {
    for duplicates in [DuplicatePolicy::FirstWins, DuplicatePolicy::LastWins] {
        let options = ParseOptions::new().duplicates(duplicates);
        if let Ok(report) = parse_with_options(data, &options) {
            let _ = report.print(&mut std::io::sink());
            let _ = report.print_json(&mut std::io::sink(), false);
            if let Some(thread) = report.crashing_thread() {
                let _ = thread.stack.as_ref().map(|stack| stack.bytes.len());
            }
        }
    }
});
