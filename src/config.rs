//! Configuration management for the notifier
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, an optional `notifier.toml` file, environment
//! variables and command-line flags.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub core: CoreConfig,
    /// Settings for the outbound HTTP clients.
    pub http: HttpConfig,
    /// Settings for the in-process job engine.
    pub engine: EngineConfig,
    /// Per-provider delivery settings.
    pub delivery: DeliveryConfig,
}

/// General settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// The logging level for the application.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Settings for the outbound HTTP clients.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Total request timeout in seconds.
    pub timeout_seconds: u64,
    /// The `User-Agent` sent with every delivery.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: concat!("notifier/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Settings for the in-process job engine.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Jobs that may wait in the queue before submissions are refused.
    pub queue_capacity: usize,
    /// Number of worker tasks executing jobs.
    pub worker_count: usize,
    /// Delay before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound for the retry delay, in seconds.
    pub backoff_max_seconds: u64,
    /// Jitter applied to retry delays (0.0 to 1.0).
    pub backoff_jitter: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            worker_count: num_cpus::get(),
            backoff_base_ms: 10_000,
            backoff_max_seconds: 1800,
            backoff_jitter: 0.25,
        }
    }
}

/// Per-provider delivery settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Pause after each attempt against a rate-limited provider, in milliseconds.
    pub rate_limit_interval_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate_limit_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in order: defaults, the TOML file named by
    /// `--config` (if any), `NOTIFIER_` environment variables (nested keys
    /// separated by `__`, e.g. `NOTIFIER_ENGINE__WORKER_COUNT=8`), then
    /// command-line flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment
            .merge(Env::prefixed("NOTIFIER_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}
