// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use minidump_report::{parse_with_options, DuplicatePolicy, ParseOptions, PartialListPolicy, Report};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

/// Prints what can be recovered from a minidump, damaged streams included.
#[derive(Parser, Debug)]
#[command(name = "minidump-inspect")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("output-format").args(["json", "raw"])))]
struct Cli {
    /// Path to the minidump, or `-` to read it from stdin.
    minidump: PathBuf,

    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,

    /// Indent the --json output.
    #[arg(long, requires = "json")]
    pretty: bool,

    /// Print only the Linux text streams and the undecoded streams, as found in the dump.
    ///
    /// NUL bytes in the Linux streams are shown as `\0` followed by a line break; undecoded
    /// streams are shown as hex.
    #[arg(long)]
    raw: bool,

    /// Where to write the output to (if unspecified, stdout is used).
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Decode streams one after another instead of on the thread pool.
    #[arg(long)]
    sequential: bool,

    /// When a stream appears more than once, use the last copy instead of the first.
    #[arg(long)]
    last_wins: bool,

    /// Drop list streams that declare more entries than they hold instead of keeping what fits.
    #[arg(long)]
    discard_partial: bool,

    /// Exit with status 2 if any stream was damaged.
    #[arg(long)]
    strict: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> ParseOptions {
        ParseOptions::new()
            .duplicates(if self.last_wins {
                DuplicatePolicy::LastWins
            } else {
                DuplicatePolicy::FirstWins
            })
            .partial_lists(if self.discard_partial {
                PartialListPolicy::Discard
            } else {
                PartialListPolicy::Keep
            })
            .parallel(!self.sequential)
    }
}

fn read_input(cli: &Cli) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if cli.minidump.as_os_str() == "-" {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("reading minidump from stdin")?;
    } else {
        File::open(&cli.minidump)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .with_context(|| format!("reading {}", cli.minidump.display()))?;
    }
    Ok(bytes)
}

fn print_raw<W: Write>(report: &Report<'_>, output: &mut W) -> io::Result<()> {
    for text in &report.linux {
        text.print(output)?;
    }
    for stream in &report.unknown_streams {
        stream.print(output)?;
    }
    Ok(())
}

fn write_report<W: Write>(cli: &Cli, report: &Report<'_>, output: &mut W) -> Result<()> {
    if cli.json {
        report
            .print_json(output, cli.pretty)
            .context("writing JSON report")?;
        writeln!(output)?;
    } else if cli.raw {
        print_raw(report, output)?;
    } else {
        report.print(output)?;
    }
    output.flush()?;
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let bytes = read_input(&cli)?;
    debug!("read {} bytes", bytes.len());
    let report = parse_with_options(&bytes, &cli.options())
        .with_context(|| format!("{} is not a readable minidump", cli.minidump.display()))?;

    match cli.output_file {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_report(&cli, &report, &mut BufWriter::new(file))?;
        }
        None => {
            let stdout = io::stdout();
            write_report(&cli, &report, &mut stdout.lock())?;
        }
    }

    if cli.strict && !report.diagnostics.is_empty() {
        if !cli.json {
            let mut stderr = io::stderr();
            report.print_diagnostics(&mut stderr)?;
        }
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
