//! Configuration handling
//!
//! A small serde-backed config covering what varies between installations:
//! which port to use (or auto-discovery), which hardware variant is
//! attached, and tooling overrides. Stored as JSON next to the binary or at
//! an explicit path.

use crate::device::Hardware;
use crate::error::{Error, Result};
use crate::profile::ToolingProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Explicit device path; `None` means discover the first EBB
    pub port: Option<String>,
    /// Reopen the port and keep accepting plans after a disconnect
    pub auto_reconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: None,
            auto_reconnect: true,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Attached hardware variant
    pub hardware: Hardware,
    /// Tooling override; `None` uses the stock profile for the hardware
    pub tooling: Option<ToolingProfile>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::other(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
