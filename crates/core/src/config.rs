use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ranges::{decoder_by_name, HexRangeDecoder, RangeLineDecoder};

fn default_decoder() -> String {
    HexRangeDecoder::NAME.to_string()
}

/// Serializable description of a coverage session: which program to
/// disassemble and which coverage files to import against it.
///
/// Stored as JSON or YAML; the file extension picks the format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Program image to disassemble (ELF, PE, Mach-O, or a raw blob).
    pub binary: PathBuf,
    /// Architecture override (e.g. x86_64, arm64).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Load address for raw blobs, as hex text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_address: Option<String>,
    /// Coverage files to import.
    #[serde(default)]
    pub coverage: Vec<PathBuf>,
    /// Name of the line decoder for the coverage files.
    #[serde(default = "default_decoder")]
    pub decoder: String,
}

impl SessionConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            arch: None,
            base_address: None,
            coverage: Vec::new(),
            decoder: default_decoder(),
        }
    }

    /// Makes relative paths relative to `dir` instead of the working directory.
    pub fn resolve_relative_to(&mut self, dir: &Path) {
        if self.binary.is_relative() {
            self.binary = dir.join(&self.binary);
        }
        for path in &mut self.coverage {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    pub fn base_address(&self) -> Result<Address> {
        match &self.base_address {
            Some(text) => text
                .parse::<Address>()
                .with_context(|| format!("Invalid base_address in session config: {text}")),
            None => Ok(Address::new(0)),
        }
    }

    pub fn decoder(&self) -> Result<Box<dyn RangeLineDecoder>> {
        decoder_by_name(&self.decoder)
            .ok_or_else(|| anyhow!("Unknown coverage decoder: {}", self.decoder))
    }
}

/// Load a session config from disk, resolving its relative paths against the
/// config file's directory.
pub fn load_session_config(path: &Path) -> Result<SessionConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session config at {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let mut config: SessionConfig = if is_yaml {
        serde_yaml::from_str(&body).context("Failed to parse session config YAML")?
    } else {
        serde_json::from_str(&body).context("Failed to parse session config JSON")?
    };
    if let Some(dir) = path.parent() {
        config.resolve_relative_to(dir);
    }
    Ok(config)
}
