//! Mock Vault server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────▶ http server ──▶ auth (token, policy) ──▶ route table snapshot
//!                                                          │
//!                                                          ▼
//!                                    compiled handler (sys / kv / custom)
//!                                                          │
//!     Client Response                                      ▼
//!     ◀────── evaluated result ◀─────────────── handler result
//!
//!     admin API / config reload ──▶ mount manager ──▶ new table snapshot
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use mock_vault::config::loader::load_config;
use mock_vault::config::watcher::ConfigWatcher;
use mock_vault::lifecycle::signals::wait_for_signal;
use mock_vault::observability::{logging, metrics};
use mock_vault::{HttpServer, MockServerConfig, Shutdown};

#[derive(Parser)]
#[command(name = "mock-vault")]
#[command(about = "Mock Vault server with runtime-mountable routes", long_about = None)]
struct Args {
    /// TOML config file; watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => MockServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mock-vault starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        mounts = config.effective_mounts().len(),
        admin_enabled = config.admin.enabled,
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // the watcher stops when dropped
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(w) => (Some(w), updates),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start config watcher, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
