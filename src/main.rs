//! view-proxy
//!
//! A reverse proxy for HTTP and WebSocket traffic built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   VIEW PROXY                      │
//!                        │                                                   │
//!   Client Request       │  ┌────────┐   ┌────────────┐   ┌──────────────┐   │
//!   ─────────────────────┼─▶│  http  │──▶│ dispatcher │──▶│  http relay  │───┼──▶ Backend
//!                        │  │ server │   │ (mount     │   │ (+ content   │   │    (HTTP)
//!                        │  └────────┘   │  prefix)   │   │   rewrite)   │   │
//!                        │               │            │   └──────────────┘   │
//!                        │               │            │   ┌──────────────┐   │
//!   Client WebSocket     │               │            │──▶│  websocket   │   │
//!   ◀────────────────────┼──────────────▶│            │   │   bridge     │◀──┼──▶ Backend
//!                        │               └────────────┘   │ (two pumps)  │   │    (WS)
//!                        │                                └──────────────┘   │
//!                        │  ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐ │
//!                        │  │ config  │ │ routing  │ │observa-  │ │life-   │ │
//!                        │  │         │ │ rewrite  │ │ bility   │ │cycle   │ │
//!                        │  └─────────┘ └──────────┘ └──────────┘ └────────┘ │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use view_proxy::config::{load_config, ProxyConfig};
use view_proxy::lifecycle::{wait_for_signal, Shutdown};
use view_proxy::observability::{logging, metrics};
use view_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "view-proxy", version, about = "HTTP and WebSocket reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "view-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        config_file = ?cli.config,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
