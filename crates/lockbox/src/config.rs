//! Configuration loading and validation.
//!
//! All values are read from `LOCKBOX_*` environment variables. Loading fails
//! with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::keys::KeyBytes;

/// Validated lockbox configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Hex-encoded 32-byte master key. **Required.**
    pub master_key: String,

    /// Comma-separated hex master keys retired by rotation, newest first.
    #[serde(default)]
    pub previous_master_keys: String,

    /// Whether ciphertext columns hold text-encoded envelopes.
    #[serde(default = "default_encode")]
    pub encode: bool,

    /// Initial state of the process-wide protected mode.
    #[serde(default)]
    pub protected_mode: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_encode() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from `LOCKBOX_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("LOCKBOX"))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.master_key, "LOCKBOX_MASTER_KEY")?;
        KeyBytes::from_hex(&self.master_key)
            .context("LOCKBOX_MASTER_KEY must be 64 hex characters")?;
        for (index, key) in self.previous_keys().enumerate() {
            KeyBytes::from_hex(key).with_context(|| {
                format!("LOCKBOX_PREVIOUS_MASTER_KEYS entry {index} must be 64 hex characters")
            })?;
        }
        ensure_non_empty(&self.log_level, "LOCKBOX_LOG_LEVEL")?;
        Ok(())
    }

    /// Iterate the retired master keys, skipping blank entries.
    pub fn previous_keys(&self) -> impl Iterator<Item = &str> {
        self.previous_master_keys
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
