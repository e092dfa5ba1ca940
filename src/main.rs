//! Manuscript gateway server.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌────────────────────────────────────────────────────┐
//!                       │                      GATEWAY                       │
//!  Client Request       │  ┌────────────┐   ┌─────────────┐   ┌───────────┐  │
//!  ─────────────────────┼─▶│ request id │──▶│ correlation │──▶│ recovery  │  │
//!                       │  │  + trace   │   │     id      │   │ (retries) │  │
//!                       │  └────────────┘   └─────────────┘   └─────┬─────┘  │
//!                       │                                           ▼        │
//!                       │                                    ┌───────────┐   │
//!                       │                                    │ admission │   │
//!                       │                                    │  + queue  │   │
//!                       │                                    └─────┬─────┘   │
//!                       │                                          ▼         │
//!                       │  ┌─────────────┐   ┌──────────┐   ┌───────────┐    │
//!                       │  │  breaker    │◀──│ upstream │◀──│  routes   │    │
//!                       │  │  registry   │   │   pool   │   │ health/   │    │
//!                       │  └─────────────┘   └────┬─────┘   │ admin     │    │
//!                       │                         │         └───────────┘    │
//!                       └─────────────────────────┼──────────────────────────┘
//!                                                 ▼
//!                                           Dependencies
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use manuscript_gateway::config::{loader::load_config, watcher::ConfigWatcher};
use manuscript_gateway::lifecycle::signals::spawn_signal_handler;
use manuscript_gateway::observability::{logging, metrics};
use manuscript_gateway::{GatewayConfig, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "manuscript-gateway")]
#[command(about = "Resilient HTTP gateway for the manuscript service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "config/gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_exists = args.config.exists();
    let config = if config_exists {
        load_config(&args.config)?
    } else {
        GatewayConfig::default()
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "manuscript-gateway starting");
    if config_exists {
        tracing::info!(path = ?args.config, "Configuration loaded");
    } else {
        tracing::warn!(path = ?args.config, "Configuration file not found, using defaults");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Watcher guard must stay alive for reloads to keep flowing.
    let (_watcher, config_updates) = if config_exists {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        (Some(watcher.run()?), updates)
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
