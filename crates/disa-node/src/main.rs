//! DISA node binary.
//!
//! Hosts some or all of the disaster-response services on one bus. Every
//! node runs the same binary; `services` in the config (or `DISA_SERVICES`)
//! decides which consumer queues this process listens on.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, or
//!    `disa-config.yaml`, falling back to defaults
//! 2. Initialize structured logging (tracing)
//! 3. Connect the bus backend
//! 4. Declare queues, build services and spawn listeners
//! 5. Wait for a shutdown signal
//! 6. Drain listeners and the outbox relay

mod config;
mod error;
mod signals;

use std::path::{Path, PathBuf};

use disa_bus::{Bus, NatsBus};
use disa_services::Platform;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{BusBackend, BusConfig, ConfigError, LoggingConfig, NodeConfig};
use crate::error::NodeError;

const DEFAULT_CONFIG_PATH: &str = "disa-config.yaml";

/// Application entry point for a DISA node.
///
/// # Errors
///
/// Returns an error if configuration, the bus connection, or platform
/// startup fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), NodeError> {
    // 1. Load configuration.
    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("disa-node starting");
    if path.exists() {
        info!(path = %path.display(), "Configuration loaded");
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
    }

    // 3. Connect the bus.
    let bus = connect_bus(&config.bus).await?;
    info!(backend = bus.name(), "Bus connected");

    // 4. Start the platform.
    let platform = Platform::start(bus, config.platform_config()).await?;
    for (queue, _) in platform.listener_stats() {
        info!(queue, "Listening");
    }

    // 5. Wait for shutdown.
    signals::wait_for_shutdown_signal()
        .await
        .map_err(|e| NodeError::Signal {
            message: e.to_string(),
        })?;
    info!("Shutdown signal received");

    // 6. Drain.
    let stats: Vec<_> = platform
        .listener_stats()
        .into_iter()
        .map(|(queue, stats)| (queue.to_owned(), stats))
        .collect();
    let pending = platform.outbox_pending().await;
    platform.shutdown().await;
    for (queue, stats) in stats {
        info!(
            queue,
            handled = stats.handled(),
            failed = stats.failed(),
            dead_lettered = stats.dead_lettered(),
            "Listener summary"
        );
    }
    if pending > 0 {
        warn!(pending, "Outbox entries left unpublished at shutdown");
    }
    info!("disa-node stopped");
    Ok(())
}

fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    if path.exists() {
        NodeConfig::from_file(path)
    } else {
        let mut config = NodeConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

async fn connect_bus(config: &BusConfig) -> Result<Bus, NodeError> {
    match config.backend {
        BusBackend::Memory => Ok(Bus::in_memory()),
        BusBackend::Nats => {
            info!(url = config.nats_url, stream = config.stream, "Connecting to NATS");
            let nats =
                NatsBus::connect(&config.nats_url, &config.stream, &config.subject_prefix).await?;
            Ok(Bus::Nats(nats))
        }
    }
}
