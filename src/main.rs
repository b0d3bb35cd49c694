//! Access Guard
//!
//! An HTTP front door that authenticates callers and enforces path- and
//! method-based permissions before a request reaches its handler.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     ACCESS GUARD                      │
//!                    │                                                       │
//!  Client Request    │  ┌─────────┐   ┌────────────────┐   ┌─────────────┐  │
//!  ──────────────────┼─▶│  http   │──▶│ access control │──▶│   handler   │  │
//!                    │  │ server  │   │   middleware   │   │ (+endpoint  │  │
//!                    │  └─────────┘   └───────┬────────┘   │   checks)   │  │
//!                    │                        │            └─────────────┘  │
//!                    │                        ▼                              │
//!                    │  ┌──────────────────────────────────────────────┐    │
//!                    │  │ guard: index (matcher) → chain (policies)     │    │
//!                    │  │        authenticator (mechanisms, lazy id)    │    │
//!                    │  └──────────────────────────────────────────────┘    │
//!                    │                                                       │
//!                    │  ┌─────────┐ ┌──────────────┐ ┌─────────────────┐    │
//!                    │  │ config  │ │ observability│ │    lifecycle    │    │
//!                    │  └─────────┘ └──────────────┘ └─────────────────┘    │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use access_guard::config::{load_config, GuardConfig};
use access_guard::guard::AccessGuard;
use access_guard::http::HttpServer;
use access_guard::lifecycle::{signals, Shutdown};
use access_guard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "access-guard")]
#[command(about = "Authenticating, permission-enforcing HTTP front door", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,
    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Check => check(&config),
        Commands::Serve => serve(config).await,
    }
}

fn check(config: &GuardConfig) -> Result<(), Box<dyn std::error::Error>> {
    AccessGuard::from_config(&config.auth)?;
    println!(
        "configuration ok: {} mechanism(s), {} named polic(ies), {} permission(s)",
        config.auth.mechanisms.len(),
        config.auth.policies.len(),
        config.auth.permissions.len()
    );
    Ok(())
}

async fn serve(config: GuardConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("access-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        proactive = config.auth.proactive,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(Arc::clone(&shutdown));

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
