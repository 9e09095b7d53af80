//! tsquery API Server
//!
//! Run with: cargo run --bin tsquery -- --config config.toml
//!
//! # Configuration
//!
//! Loaded from `--config`, else the default locations (see [`Config::load_default`]).
//! Environment variables override file values:
//! - `TSQUERY_API_HOST`, `TSQUERY_API_PORT`
//! - `TSQUERY_HTTP_TIMEOUT_SECS`, `TSQUERY_QUERY_TIMEOUT_SECS`
//! - `TSQUERY_LOG_LEVEL`, `TSQUERY_LOG_FORMAT`
//! - `RUST_LOG`: takes precedence over the configured level

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsquery::api::{serve, ApiConfig, AppState};
use tsquery::config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(name = "tsquery")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Time-series query server")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging);

    tracing::info!("Starting tsquery server v{}", env!("CARGO_PKG_VERSION"));

    let client = config
        .http
        .build_client()
        .context("building HTTP client")?;
    let registry = tsquery::default_registry(client);

    for ds in &config.datasources {
        if registry.contains(&ds.backend_type) {
            tracing::info!(datasource = %ds.name, backend = %ds.backend_type, "Data source configured");
        } else {
            tracing::warn!(datasource = %ds.name, backend = %ds.backend_type, "No backend registered for data source");
        }
    }

    let api_config = ApiConfig::from_config(&config);
    let state = AppState::new(registry, config.datasources.clone(), api_config.clone());

    serve(state, &api_config).await?;

    Ok(())
}

/// Initialize tracing from the logging section
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("tsquery={},tower_http=info", logging.level).into()
    });

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
