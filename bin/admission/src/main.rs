//! Admission receiver.
//!
//! Listens for admission packets over UDP, validates and decodes each one, and keeps counts of what it saw.
#![deny(missing_docs)]

use std::{path::PathBuf, time::Duration};

use admission_app::prelude::*;
use admission_core::{dispatcher::Dispatcher, packetizer::MetricsSource as _, panics::set_panic_hook, spawn_traced};
use admission_error::{ErrorContext as _, GenericError};
use clap::Parser as _;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
use self::config::{AdmissionConfiguration, Cli};

mod handler;
use self::handler::DecodingHandler;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    set_panic_hook();

    if let Err(e) = initialize_logging(None) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    let registry = match initialize_metrics("admission") {
        Ok(registry) => registry,
        Err(e) => {
            fatal_and_exit(format!("failed to initialize metrics: {}", e));
            return;
        }
    };

    match run(cli.config, registry).await {
        Ok(()) => info!("Admission receiver stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config_path: Option<PathBuf>, registry: MetricsRegistry) -> Result<(), GenericError> {
    let config = AdmissionConfiguration::load(config_path.as_deref())?;

    let receiver = config
        .receiver
        .build_receiver()
        .error_context("Failed to bind receiver.")?;
    let pool = config.receiver.build_pool();
    info!(
        listen_addr = %receiver.local_addr()?,
        batch_size = config.receiver.dispatcher.batch_size,
        max_in_flight = config.receiver.dispatcher.max_in_flight,
        "Admission receiver starting..."
    );

    let shutdown = CancellationToken::new();
    spawn_traced(cancel_on_ctrl_c(shutdown.clone()));
    if config.stats_interval_secs > 0 {
        spawn_traced(report_stats(
            registry,
            Duration::from_secs(config.stats_interval_secs),
            shutdown.clone(),
        ));
    }

    Dispatcher::from_configuration(&config.receiver.dispatcher, receiver, DecodingHandler::new(), pool)
        .run(shutdown)
        .await
        .error_context("Dispatcher failed.")
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down..."),
    }
    shutdown.cancel();
}

async fn report_stats(registry: MetricsRegistry, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => registry.for_each(&mut |name, value| info!(metric = name, value, "Internal metric.")),
        }
    }
}
