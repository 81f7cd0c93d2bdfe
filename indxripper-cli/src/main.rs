//! Command-line entry point. Grounded in `onuse-moses/cli/src/main.rs`'s
//! overall shape (`clap` derive parse → dispatch → `anyhow::Result<()>`
//! from `main`), trimmed to a single linear pipeline since this tool has
//! one job rather than a subcommand tree.

mod format;
mod sink;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use indxripper_core::driver::{Driver, RunOptions};
use indxripper_core::volume::Volume;

use format::OutputFormat;
use sink::FileSink;

/// Carve file-metadata records, including deleted ones still resident in
/// index-block slack, from an NTFS volume's directory indexes.
#[derive(Parser, Debug)]
#[command(name = "indxripper", version, about, long_about = None)]
struct Cli {
    /// Path to the NTFS image or device.
    image_or_device: PathBuf,

    /// Path to write output lines to (appended if it already exists).
    output_path: PathBuf,

    /// NTFS partition starts at sector N.
    #[arg(short = 'o', long = "offset", default_value_t = 0)]
    partition_start_sector: u64,

    /// Prepend PREFIX to every emitted path (no separator inserted).
    #[arg(short = 'm', long = "prefix", default_value = "")]
    path_prefix: String,

    /// Output format: csv or bodyfile.
    #[arg(short = 'f', long = "format", default_value = "csv")]
    format: String,

    /// Drop slack/allocated entries that duplicate a still-live file.
    #[arg(long = "no-active-files")]
    no_active_files: bool,

    /// Skip `$INDEX_ALLOCATION` of directories whose in-use flag is clear.
    #[arg(long = "skip-deleted-dirs")]
    skip_deleted_dirs: bool,

    /// Deduplicate identical output lines.
    #[arg(long = "dedup")]
    dedup: bool,

    /// Increase log verbosity (-v for info, -vv for debug).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::from(0)
                }
                _ => ExitCode::from(1),
            };
        }
    };
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::from(0),
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            ExitCode::from(1)
        }
        Err(CliError::Runtime(msg)) => {
            error!("{msg}");
            eprintln!("{msg}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    Usage(String),
    Runtime(String),
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let format = OutputFormat::parse(&cli.format)
        .ok_or_else(|| CliError::Usage(format!("unknown format '{}': expected csv or bodyfile", cli.format)))?;

    let volume = Volume::open(&cli.image_or_device, cli.partition_start_sector)
        .map_err(|e| CliError::Runtime(format!("failed to open volume: {e}")))?;

    let output_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.output_path)
        .map_err(|e| CliError::Runtime(format!("failed to open output file: {e}")))?;

    let mut sink = FileSink::new(output_file, format, cli.dedup);

    let options = RunOptions {
        partition_start_sector: cli.partition_start_sector,
        path_prefix: cli.path_prefix.clone(),
        no_active_files: cli.no_active_files,
        skip_deleted_dirs: cli.skip_deleted_dirs,
    };

    let mut driver = Driver::new(volume, options);
    driver
        .run(&mut sink)
        .map_err(|e| CliError::Runtime(format!("run failed: {e}")))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
