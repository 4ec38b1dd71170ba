//! Configuration for the transcript engine.
//!
//! Loads from a TOML file with sensible defaults; every section and field
//! is optional.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tools::{DEFAULT_MAX_CHARS, ToolLimits};

/// Engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub finalize: FinalizeConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Event stream consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Cap on a single buffered line, guarding against unbounded growth
    /// when the transport never delivers a newline.
    pub max_line_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 1024 * 1024,
        }
    }
}

/// Finalization settle windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    /// Delay before sampling the resolver's pending count.
    pub settle_delay_ms: u64,
    /// Upper bound on waiting for pending image resolutions.
    pub image_wait_ms: u64,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            image_wait_ms: 5000,
        }
    }
}

impl FinalizeConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn image_wait(&self) -> Duration {
        Duration::from_millis(self.image_wait_ms)
    }
}

/// Tool-result truncation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Allowance for tools without a `max_chars` entry.
    pub default_max_chars: usize,
    /// Per-tool overrides, merged over the built-in table.
    pub max_chars: HashMap<String, usize>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_max_chars: DEFAULT_MAX_CHARS,
            max_chars: HashMap::new(),
        }
    }
}

impl ToolsConfig {
    /// Resolves the effective truncation table.
    pub fn limits(&self) -> ToolLimits {
        ToolLimits::new(self.default_max_chars, self.max_chars.clone())
    }
}
