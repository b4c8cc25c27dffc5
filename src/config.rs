//! Configuration management for Chargeflow
//!
//! This module handles loading, validation, and management of the client
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{ChargeflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable overriding `api.base_url`
pub const ENV_API_URL: &str = "CHARGEFLOW_API_URL";

/// Environment variable overriding `api.token`
pub const ENV_API_TOKEN: &str = "CHARGEFLOW_API_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Charging backend connection
    pub api: ApiConfig,

    /// Tariff used for live cost estimation
    pub pricing: PricingConfig,

    /// Session clock timing
    pub clock: ClockConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Charging backend connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API, without trailing slash
    pub base_url: String,

    /// Bearer token sent with every call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

/// Pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Rate per kWh in the account currency
    pub cost_per_kwh: f64,

    /// Currency symbol
    pub currency_symbol: String,
}

/// Session clock timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Simulation tick in milliseconds; each tick advances one second of charge
    pub tick_interval_ms: u64,

    /// Interval between progress pushes to the backend
    pub sync_interval_seconds: u64,

    /// Delay before the single finalize retry
    pub finalize_retry_delay_ms: u64,
}

impl ClockConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds)
    }

    pub const fn finalize_retry_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_retry_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Console level override
    pub console_level: Option<String>,

    /// File level override
    pub file_level: Option<String>,

    /// Directory or file path for the rolling log
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to write a log file at all
    pub file_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "chargeflow.yaml",
            "/etc/chargeflow/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Environment wins over file values for the backend coordinates
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL)
            && !url.trim().is_empty()
        {
            self.api.base_url = url.trim().to_string();
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN)
            && !token.trim().is_empty()
        {
            self.api.token = Some(token.trim().to_string());
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if base.is_empty() {
            return Err(ChargeflowError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ChargeflowError::validation(
                "api.base_url",
                "Base URL must start with http:// or https://",
            ));
        }

        if self.api.timeout_seconds == 0 {
            return Err(ChargeflowError::validation(
                "api.timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if !self.pricing.cost_per_kwh.is_finite() || self.pricing.cost_per_kwh <= 0.0 {
            return Err(ChargeflowError::validation(
                "pricing.cost_per_kwh",
                "Must be positive",
            ));
        }

        if self.clock.tick_interval_ms == 0 {
            return Err(ChargeflowError::validation(
                "clock.tick_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.clock.sync_interval_seconds == 0 {
            return Err(ChargeflowError::validation(
                "clock.sync_interval_seconds",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
