use std::path::{Path, PathBuf};

use admission_config::ConfigurationLoader;
use admission_error::{ErrorContext as _, GenericError};
use admission_io::ReceiverConfiguration;
use clap::Parser;
use serde::Deserialize;

/// Command-line arguments.
#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Path to a YAML configuration file.
    ///
    /// Values from `ADMISSION_`-prefixed environment variables take precedence over the file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

const fn default_stats_interval_secs() -> u64 {
    10
}

/// Receiver process configuration.
#[derive(Debug, Deserialize)]
pub struct AdmissionConfiguration {
    /// Receiver settings, read from the top level of the configuration.
    #[serde(flatten)]
    pub receiver: ReceiverConfiguration,

    /// How often to log internal metrics, in seconds. Zero disables the report.
    ///
    /// Defaults to 10 seconds.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl AdmissionConfiguration {
    /// Loads the configuration from an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, GenericError> {
        let mut loader = ConfigurationLoader::default();
        if let Some(path) = path {
            loader = loader
                .from_yaml(path)
                .with_error_context(|| format!("Failed to load configuration file '{}'.", path.display()))?;
        }

        loader
            .from_environment("ADMISSION")?
            .into_typed()
            .error_context("Failed to parse configuration.")
    }
}
