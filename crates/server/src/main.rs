//! ferry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use ferry_core::config::AppConfig;
use ferry_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ferry - upload parts of files to a remote message service
#[derive(Parser, Debug)]
#[command(name = "ferry-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "FERRY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ferry=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ferry v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; every field has a default and env vars override.
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("FERRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let warnings = config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    for warning in warnings {
        tracing::warn!("{warning}");
    }

    ferry_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = ferry_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    let connector = ferry_transport::from_config(&config.transport)
        .context("failed to initialize transport")?;
    tracing::info!(backend = connector.backend_name(), "Transport initialized");

    let state = AppState::new(config.clone(), metadata, connector);

    if config.uploads.sweep_enabled {
        let interval = config.uploads.sweep_interval();
        ferry_server::sweep::spawn(state.clone(), interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Retention sweeper spawned"
        );
    } else {
        tracing::info!("Retention sweep disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
