//! Domain gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ listener ──▶ request id / trace / timeout
//!                                        │
//!                                        ▼
//!                               ┌──────────────────┐      ┌────────────────┐
//!                               │  domain lookup   │─────▶│ lookup service │
//!                               │   middleware     │◀─────│  (GET ?domain) │
//!                               └────────┬─────────┘      └────────────────┘
//!                                        │  TTL cache
//!                 302 / 401 / 404 / 500 ◀┤
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │  proxy handler   │──────▶ Upstream
//!                               └──────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use domain_gate::config::{load_config, ConfigWatcher};
use domain_gate::observability::{logging, metrics};
use domain_gate::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "domain-gate")]
#[command(about = "Host-based identity lookup and access gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "domain-gate.toml")]
    config: PathBuf,

    /// Disable hot reload of the configuration file.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!("domain-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        lookup_service = %config.lookup.service_url,
        default_ttl_secs = config.lookup.default_ttl_secs,
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

    let (watcher, config_updates) = ConfigWatcher::new(&cli.config);
    // Dropping the watcher stops notifications, so hold it until exit.
    let _watcher = if cli.no_watch {
        None
    } else {
        match watcher.run() {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                None
            }
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
