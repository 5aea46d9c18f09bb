use std::path::Path;

use anyhow::Result;
use covkeeper_core::config::load_session_config;
use covkeeper_core::model::CancellationToken;

use crate::commands::summary_command;

/// Run a session described by a JSON/YAML config and print its summary.
pub fn run_command(config_path: &Path, json: bool, token: &CancellationToken) -> Result<()> {
    let config = load_session_config(config_path)?;
    let decoder = config.decoder()?;
    summary_command(
        &config.binary,
        config.arch.as_deref(),
        config.base_address.as_deref(),
        &config.coverage,
        decoder,
        json,
        token,
    )
}
