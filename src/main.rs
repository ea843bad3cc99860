//! Forward proxy with per-domain daily bandwidth quotas.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                  QUOTA PROXY                     │
//!                         │                                                  │
//!   Client ──────────────▶│  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!   (CONNECT or           │  │   net    │──▶│ handler  │──▶│    http     │   │
//!    absolute-form GET)   │  │ listener │   │  state   │   │ request line│   │
//!                         │  └──────────┘   │ machine  │   └─────────────┘   │
//!                         │                 └────┬─────┘                     │
//!                         │                      │ check_and_charge          │
//!                         │                      ▼                           │
//!                         │               ┌─────────────┐   ┌────────────┐   │
//!                         │               │   quota     │◀──│ daily reset│   │
//!                         │               │   ledger    │   │ (midnight) │   │
//!                         │               └─────▲───────┘   └────────────┘   │
//!                         │                     │ bytes relayed              │
//!   Client ◀─────────────▶│               ┌─────┴───────┐                    │
//!                         │               │    relay    │◀──────────────────▶│── Origin
//!                         │               └─────────────┘                    │
//!                         │                                                  │
//!                         │  console (start / stop / add / usage)            │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use quota_proxy::config::loader::{load_config, ConfigError};
use quota_proxy::config::validation::validate_config;
use quota_proxy::config::ProxyConfig;
use quota_proxy::console::{self, Console};
use quota_proxy::lifecycle::{signals, ProxyController};
use quota_proxy::observability::{logging, metrics};
use quota_proxy::QuotaLedger;

#[derive(Parser)]
#[command(name = "quota-proxy")]
#[command(version, about = "Forward HTTP/HTTPS proxy with per-domain daily bandwidth quotas", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address, e.g. 127.0.0.1:8080
    #[arg(short, long)]
    bind: Option<String>,

    /// Start the proxy immediately instead of waiting for a console "start"
    #[arg(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability);
    tracing::info!("quota-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backlog = config.listener.backlog,
        idle_timeout_secs = config.timeouts.idle_secs,
        seeded_limits = config.quotas.limits_mb.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let ledger = Arc::new(QuotaLedger::new());
    let mut controller = ProxyController::new(config, ledger);
    if args.start {
        let addr = controller.start()?;
        println!("Proxy started, listening at {}.", addr);
    }

    Console::new(controller)
        .run(console::stdin_lines(), signals::shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
