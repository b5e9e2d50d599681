//! Wallet provider relay server.
//!
//! # Architecture Overview
//!
//! ```text
//!   embedded frame                 ┌──────────────────────────────────────────┐
//!   ──── WebSocket ──────────────▶ │  http ──▶ relay ──▶ provider scope       │
//!   ◀─── metadata / responses ──── │   ▲        │  ▲         (fixtures)       │
//!        events                    │   │        ▼  │                          │
//!                                  │  endpoint directory    discovery loop    │
//!                                  └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use provider_relay::config::{load_config, RelayConfig};
use provider_relay::lifecycle::{assemble, signals, Shutdown};
use provider_relay::observability::{logging, metrics};
use provider_relay::RelayServer;

#[derive(Parser)]
#[command(name = "provider-relay")]
#[command(about = "Relay wallet providers to embedded frames", long_about = None)]
struct Args {
    /// TOML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("provider-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.listener.path,
        target_origin = %config.relay.target_origin,
        providers = config.relay.providers.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        trigger.trigger();
    });

    let server = RelayServer::new(assemble(&config), &config.listener);
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
