use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use covkeeper::{
    align_command, check_command, init_logging, install_cancel_handler, run_command,
    summary_command,
};
use covkeeper_core::ranges::HexRangeDecoder;

/// Instruction-aligned coverage from external coverage records.
///
/// This CLI is a thin wrapper around `covkeeper-core` (exposed in code as
/// `covkeeper_core`). All substantive logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "covkeeper",
    version,
    about = "Instruction-aligned coverage from external coverage records",
    long_about = None
)]
struct Cli {
    /// Log debug details to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// Program image to disassemble (ELF, PE, Mach-O, or a raw blob).
    #[arg(long)]
    binary: PathBuf,

    /// Architecture override (e.g., x86_64, arm64). Required for raw blobs
    /// that are not x86_64.
    #[arg(long)]
    arch: Option<String>,

    /// Load address for raw blobs, in hex.
    #[arg(long)]
    base: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse coverage files and report their contents, without a binary.
    Check {
        /// Coverage files to validate.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the instruction-aligned hits for a set of coverage files.
    Align {
        #[command(flatten)]
        target: Target,

        /// Coverage files to import.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the raw union of covered ranges instead of instruction hits.
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print per-function coverage for a set of coverage files.
    Summary {
        #[command(flatten)]
        target: Target,

        /// Coverage files to import.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run a session described by a JSON or YAML config file.
    Run {
        /// Path to the session config.
        #[arg(long)]
        config: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Check { files, json } => check_command(&files, json)?,
        Command::Align { target, files, raw, json } => {
            let token = install_cancel_handler()?;
            align_command(
                &target.binary,
                target.arch.as_deref(),
                target.base.as_deref(),
                &files,
                raw,
                json,
                &token,
            )?
        }
        Command::Summary { target, files, json } => {
            let token = install_cancel_handler()?;
            summary_command(
                &target.binary,
                target.arch.as_deref(),
                target.base.as_deref(),
                &files,
                Box::new(HexRangeDecoder),
                json,
                &token,
            )?
        }
        Command::Run { config, json } => {
            let token = install_cancel_handler()?;
            run_command(&config, json, &token)?
        }
    }

    Ok(())
}
