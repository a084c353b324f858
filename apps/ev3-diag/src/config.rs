use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Conventional location of the diagnostics configuration on the brick.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ev3-diag/logging.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub ansi: bool,
    /// Pause between test phases, in milliseconds
    pub pace_ms: u64,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
            pace_ms: 1000,
        }
    }
}

impl DiagConfig {
    /// Load the configuration; a missing or malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing yaml: {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty file means all defaults
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}
