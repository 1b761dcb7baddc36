//! Admission sender.
//!
//! Periodically ships this process's internal metrics to an admission receiver.
#![deny(missing_docs)]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use admission_app::prelude::*;
use admission_config::ConfigurationLoader;
use admission_error::{ErrorContext as _, GenericError};
use admission_io::{send_metrics, SendOptions};
use admission_proto::FloatEncoding;
use clap::Parser as _;
use serde::Deserialize;
use tokio::{select, time::interval};
use tracing::{error, info, warn};

/// Command-line arguments.
#[derive(clap::Parser)]
#[command(about)]
struct Cli {
    /// Path to a YAML configuration file.
    ///
    /// Values from `ADMISSION_`-prefixed environment variables take precedence over the file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn default_application() -> String {
    "sender".to_string()
}

fn default_address() -> String {
    "127.0.0.1:6969".to_string()
}

const fn default_interval_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
struct SenderConfiguration {
    #[serde(default = "default_application")]
    application: String,

    /// Defaults to the process ID.
    #[serde(default)]
    instance_id: Option<String>,

    #[serde(default = "default_address")]
    address: String,

    #[serde(default)]
    packet_size: usize,

    #[serde(default)]
    float_encoding: FloatEncoding,

    #[serde(default)]
    headers: BTreeMap<String, String>,

    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
}

impl SenderConfiguration {
    fn load(path: Option<&Path>) -> Result<Self, GenericError> {
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

    fn send_options(&self) -> SendOptions {
        SendOptions {
            instance_id: self
                .instance_id
                .clone()
                .unwrap_or_else(|| std::process::id().to_string()),
            address: self.address.clone(),
            packet_size: self.packet_size,
            float_encoding: self.float_encoding,
            headers: self.headers.clone(),
            ..SendOptions::new(self.application.clone())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(None) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    let registry = match initialize_metrics("sender") {
        Ok(registry) => registry,
        Err(e) => {
            fatal_and_exit(format!("failed to initialize metrics: {}", e));
            return;
        }
    };

    match run(cli.config, registry).await {
        Ok(()) => info!("Admission sender stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config_path: Option<PathBuf>, registry: MetricsRegistry) -> Result<(), GenericError> {
    let config = SenderConfiguration::load(config_path.as_deref())?;
    let options = config.send_options();
    info!(
        application = %options.application,
        instance_id = %options.instance_id,
        target_addr = %options.address,
        interval_secs = config.interval_secs,
        "Admission sender starting..."
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));
    loop {
        select! {
            result = &mut shutdown => {
                result.error_context("Failed to listen for Ctrl-C.")?;
                info!("Received Ctrl-C, shutting down...");
                return Ok(());
            }
            _ = ticker.tick() => {
                let (options, registry) = (options.clone(), registry.clone());
                let result = tokio::task::spawn_blocking(move || send_metrics(&options, &registry))
                    .await
                    .error_context("Send task failed.")?;

                match result {
                    Ok(summary) if summary.send_failures > 0 => warn!(
                        packets_sent = summary.packets_sent,
                        send_failures = summary.send_failures,
                        "Some packets failed to send."
                    ),
                    Ok(summary) => info!(
                        packets_sent = summary.packets_sent,
                        samples_written = summary.samples_written,
                        samples_skipped = summary.samples_skipped,
                        "Sent metrics."
                    ),
                    // An invalid preamble fails every send the same way.
                    Err(e @ admission_io::SendError::Packetize { .. }) => {
                        return Err(e).error_context("Failed to build packets.")
                    }
                    Err(e) => warn!(error = %e, "Failed to send metrics."),
                }
            }
        }
    }
}
