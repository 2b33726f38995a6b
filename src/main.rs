//! Offload proxy.
//!
//! ```text
//!     Client ──▶ proxy ──▶ backend
//!                  │          │ response with Offload-Requested
//!                  │◀─────────┘
//!                  │──▶ offload target (method/URL/headers from the response)
//!                  │◀── offload response
//!     Client ◀─────┘    (status, headers, body replaced wholesale)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use offload_proxy::config::watcher::ConfigWatcher;
use offload_proxy::config::{load_config, ProxyConfig};
use offload_proxy::lifecycle::{signals, Shutdown};
use offload_proxy::observability::{logging, metrics};
use offload_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "offload-proxy")]
#[command(about = "Reverse proxy that serves offloaded responses on a backend's behalf", long_about = None)]
struct Cli {
    /// Path to a TOML config file; defaults are used when omitted.
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

    logging::init(&config.observability.log_level);
    tracing::info!("offload-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        header_prefix = %config.offload.header_prefix,
        offload_timeout_secs = config.offload.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config)?;

    tokio::spawn(signals::trigger_on_signal(shutdown, signals::wait_for_signal()));

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
