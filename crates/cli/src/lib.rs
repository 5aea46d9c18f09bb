use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use covkeeper_core::listing::CapstoneListing;
use covkeeper_core::model::{CancellationToken, Outcome};
use covkeeper_core::ranges::RangeLineDecoder;
use covkeeper_core::session::ImportReport;
use covkeeper_core::{Address, CoverageSession};
use tracing_subscriber::EnvFilter;

pub mod commands;

pub use commands::*;

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

/// Returns a token that is cancelled when the user presses Ctrl-C.
pub fn install_cancel_handler() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; cancelling");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(token)
}

/// Parse a hex load address such as `0x400000`.
pub fn parse_base(text: Option<&str>) -> Result<u64> {
    match text {
        Some(text) => Ok(text
            .parse::<Address>()
            .with_context(|| format!("Invalid base address: {text}"))?
            .value()),
        None => Ok(0),
    }
}

/// Disassemble `binary` and build a coverage session around its listing.
pub fn open_session(
    binary: &Path,
    arch: Option<&str>,
    base: u64,
    decoder: Box<dyn RangeLineDecoder>,
) -> Result<CoverageSession> {
    let bytes = fs::read(binary)
        .with_context(|| format!("Failed to read binary: {}", binary.display()))?;
    let listing = CapstoneListing::load(&bytes, arch, base)
        .with_context(|| format!("Failed to disassemble {}", binary.display()))?;
    tracing::info!(
        binary = %binary.display(),
        arch = listing.arch(),
        instructions = listing.listing().len(),
        "listing ready"
    );
    Ok(CoverageSession::new(Arc::new(listing)).with_decoder(Arc::from(decoder)))
}

/// Import `files` on a worker thread and wait for it.
///
/// Per-file failures are reported on stderr; the import only fails as a whole
/// when it was cancelled or when no file could be loaded.
pub fn import_files(
    session: &CoverageSession,
    files: &[impl AsRef<Path>],
    token: &CancellationToken,
) -> Result<ImportReport> {
    let paths = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let handle = session.spawn_import(paths, token.clone())?;
    let report = handle.join().map_err(|_| anyhow!("Coverage import thread panicked"))??;

    for err in &report.failed {
        eprintln!("warning: {err}");
    }
    if report.outcome == Outcome::Cancelled {
        bail!("Coverage import cancelled");
    }
    if report.imported.is_empty() && !files.is_empty() {
        bail!("No coverage file could be imported");
    }
    Ok(report)
}
