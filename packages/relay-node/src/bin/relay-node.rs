//! Relay node binary.

use clap::Parser;
use relay_node::{create_router, AppState, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for in-flight bootstrap passes at shutdown.
const LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Flags override the config file and `RELAY_*` environment.
#[derive(Debug, Parser)]
#[command(name = "relay-node", version, about = "Meta-transaction relay node")]
struct Cli {
    /// Config file (toml, yaml or json). Defaults to `relay-node.*` if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Relay owner address
    #[arg(long)]
    owner_address: Option<String>,

    /// Relay fee
    #[arg(long)]
    fee: Option<u64>,

    /// Relay public url
    #[arg(long)]
    url: Option<String>,

    /// RelayHub address
    #[arg(long)]
    relay_hub_address: Option<String>,

    /// Relay stake (wei)
    #[arg(long)]
    stake_amount: Option<u64>,

    /// Relay gas limit
    #[arg(long)]
    gas_limit: Option<u64>,

    /// Relay gas price factor (percent surcharge)
    #[arg(long)]
    gas_price_factor: Option<u64>,

    /// Relay unstake delay (seconds)
    #[arg(long)]
    unstake_delay: Option<u64>,

    /// The relay's ethereum node
    #[arg(long)]
    ethereum_node_url: Option<String>,

    /// The relay's working directory
    #[arg(long)]
    workdir: Option<String>,

    /// HTTP listen address
    #[arg(long)]
    bind_address: Option<String>,

    /// Enable /setRelayHub
    #[arg(long)]
    debug_api: bool,

    /// Enable /audit
    #[arg(long)]
    audit_api: bool,
}

fn load_config(cli: Cli) -> Result<Config, config::ConfigError> {
    let file = match &cli.config {
        Some(path) => config::File::from(path.as_path()),
        None => config::File::with_name("relay-node").required(false),
    };

    config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("owner_address", cli.owner_address)?
        .set_override_option("fee", cli.fee)?
        .set_override_option("url", cli.url)?
        .set_override_option("hub_address", cli.relay_hub_address)?
        .set_override_option("stake_amount", cli.stake_amount)?
        .set_override_option("gas_limit", cli.gas_limit)?
        .set_override_option("gas_price_factor", cli.gas_price_factor)?
        .set_override_option("unstake_delay", cli.unstake_delay)?
        .set_override_option("ethereum_node_url", cli.ethereum_node_url)?
        .set_override_option("workdir", cli.workdir)?
        .set_override_option("bind_address", cli.bind_address)?
        .set_override_option("debug_api", cli.debug_api.then_some(true))?
        .set_override_option("audit_api", cli.audit_api.then_some(true))?
        .build()?
        .try_deserialize()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting relay node");

    let config = match load_config(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "FATAL: config error, fix flags, RELAY_* env vars or relay-node.toml");
            std::process::exit(1);
        }
    };

    info!(
        hub = %config.hub_address,
        node = %config.ethereum_node_url,
        debug_api = config.debug_api,
        audit_api = config.audit_api,
        "Configuration loaded"
    );

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::from_config(config)?);

    info!(address = %state.engine.address(), "Relay address");

    state.loops.start().await;

    let app = create_router(Arc::clone(&state));

    info!(address = %bind_address, "Listening");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping background loops...");
    if tokio::time::timeout(LOOP_STOP_TIMEOUT, state.loops.stop())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = LOOP_STOP_TIMEOUT.as_secs(),
            "Background loops still busy with a pass, exiting anyway"
        );
    }

    info!("Relay node shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
