//! ws-hub
//!
//! Terminates camouflaged WebSocket connections and relays each one to an
//! upstream TCP service.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────┐
//!                    │                        WS HUB                          │
//!                    │                                                        │
//!   Client           │  ┌─────────┐   ┌────────┐   ┌─────┐   ┌────────────┐   │
//!   ─────────────────┼─▶│   net   │──▶│ PROXY  │──▶│ TLS │──▶│    http    │   │
//!                    │  │listener │   │preamble│   │     │   │ dispatcher │   │
//!                    │  └─────────┘   └────────┘   └─────┘   └─────┬──────┘   │
//!                    │                                             │          │
//!   nginx 400/403/404│◀────────────────────── rejected ────────────┤          │
//!                    │                                             ▼          │
//!                    │                                     ┌──────────────┐   │
//!                    │                                     │FramedConnect.│───┼──▶ Upstream
//!                    │                                     │   (relay)    │   │    (or echo)
//!                    │                                     └──────────────┘   │
//!                    └───────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use ws_hub::config::load_config;
use ws_hub::forward::relay;
use ws_hub::lifecycle::wait_for_signal;
use ws_hub::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "ws-hub", version, about = "Camouflaged WebSocket listener")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "ws-hub.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("ws-hub v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let target: Option<Arc<str>> = config.forward.target.as_deref().map(Arc::from);
    match &target {
        Some(target) => tracing::info!(target = %target, "Relaying upgraded connections"),
        None => tracing::info!("No forward target configured, echoing upgraded connections"),
    }

    let pipeline = ws_hub::listen(
        config.listener.address,
        config.listener.port,
        &config.transport,
        move |conn| {
            let target = target.clone();
            let remote_addr = conn.remote_addr();
            tokio::spawn(async move {
                match relay(conn, target.as_deref()).await {
                    Ok((sent, received)) => tracing::debug!(
                        remote_addr = %remote_addr,
                        sent,
                        received,
                        "Relay finished"
                    ),
                    Err(e) => tracing::debug!(remote_addr = %remote_addr, error = %e, "Relay failed"),
                }
            });
        },
    )
    .await?;

    tokio::select! {
        _ = wait_for_signal() => {
            pipeline.close();
        }
        _ = pipeline.stopped() => {
            tracing::warn!("Listener stopped unexpectedly");
        }
    }

    pipeline.stopped().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
