//! TOML configuration loader with validation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Core Config ────────────────────────────────────────────────────

/// Framework timing and telemetry parameters.
///
/// Every field has a usable default, so an empty TOML file (or no file
/// at all) yields a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Target control loop period [s].
    pub control_loop_period: f64,
    /// Minimum quiet time between unforced fault reports [s].
    pub error_report_interval: f64,
    /// Root telemetry prefix for component keys.
    pub telemetry_prefix: String,
    /// Publish tick statistics every N ticks.
    pub stats_interval: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            control_loop_period: 0.020,
            error_report_interval: 0.5,
            telemetry_prefix: "components".to_string(),
            stats_interval: 50,
        }
    }
}

impl CoreConfig {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.control_loop_period.is_finite() || self.control_loop_period <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "control_loop_period must be positive, got {}",
                self.control_loop_period
            )));
        }
        if !self.error_report_interval.is_finite() || self.error_report_interval < 0.0 {
            return Err(ConfigError::Validation(format!(
                "error_report_interval must be non-negative, got {}",
                self.error_report_interval
            )));
        }
        if self.stats_interval == 0 {
            return Err(ConfigError::Validation(
                "stats_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the framework configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<CoreConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&text)
}

/// Load config from a TOML string.
pub fn load_config_from_str(text: &str) -> Result<CoreConfig, ConfigError> {
    let config: CoreConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

// ─── Tests ──────────────────────────────────────────────────────────
