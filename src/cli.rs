//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `notifier.toml` file and environment variables.

use clap::Parser;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Figment, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Publishes a lifecycle event to the webhook targets subscribed to a topic.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Topic to publish on (http, slack, teams, email).
    #[arg(short, long)]
    pub topic: String,

    /// Path to a JSON file holding the event.
    #[arg(short, long, value_name = "FILE")]
    pub event: PathBuf,

    /// Logging level, e.g. "debug" or "notifier=trace".
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Number of job engine workers.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        // Only flags that were actually given override lower layers.
        let mut overrides = Figment::new();
        if let Some(level) = &self.log_level {
            overrides = overrides.merge(Serialized::default("core.log_level", level));
        }
        if let Some(workers) = self.workers {
            overrides = overrides.merge(Serialized::default("engine.worker_count", workers));
        }
        overrides.data()
    }
}
