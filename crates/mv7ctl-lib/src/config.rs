//! Application configuration: TOML-based, platform-aware paths.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;
use crate::error::{Mv7Error, Result};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# mv7ctl configuration. Changes made while the tool is running may be overwritten.\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HID path of the preferred device. Empty = first enumerated device.
    #[serde(default)]
    pub device_path: String,

    /// Bound on the startup handshake, in seconds. 0 = wait for the device
    /// forever, matching its hang-until-present behavior.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Wait after a batch of fetch requests before draining replies.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Listener poll interval; also bounds shutdown latency.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_handshake_timeout_secs() -> u64 {
    10
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_read_timeout_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_path: String::new(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `read_timeout_ms` is zero; the listener would spin and never notice
    /// a stop request.
    ZeroReadTimeout,
    /// `settle_delay_ms` is zero; fetch batches would drain before the
    /// device has answered anything.
    ZeroSettleDelay,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroReadTimeout => write!(f, "read_timeout_ms must be > 0"),
            ValidationError::ZeroSettleDelay => write!(f, "settle_delay_ms must be > 0"),
        }
    }
}

impl Config {
    /// Check the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.read_timeout_ms == 0 {
            errors.push(ValidationError::ZeroReadTimeout);
        }
        if self.settle_delay_ms == 0 {
            errors.push(ValidationError::ZeroSettleDelay);
        }
        errors
    }

    /// Engine timings derived from the configured values.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            handshake_timeout: (self.handshake_timeout_secs > 0)
                .then(|| Duration::from_secs(self.handshake_timeout_secs)),
        }
    }

    /// Platform path of the config file (`~/.config/mv7ctl/config.toml` on
    /// Linux). `None` when the platform exposes no config directory.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mv7ctl").join("config.toml"))
    }

    /// Read a config file.
    pub fn load_from(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Mv7Error::Config(format!("{}: {e}", path.display())))
    }

    /// Read the platform config file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load_or_default() -> Config {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("could not read config, using defaults: {e}");
                Config::default()
            }),
            _ => Config::default(),
        }
    }

    /// Write the config to a file, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(self)
            .map_err(|e| Mv7Error::Config(format!("serialize: {e}")))?;
        fs::write(path, format!("{CONFIG_HEADER}{body}"))?;
        Ok(())
    }
}
