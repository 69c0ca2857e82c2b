//! catalist-ai - Product cataloguing service
//!
//! Extracts structured catalogue entities from product images, page URLs
//! and CSV rows through a hosted model, serves the review pipeline over
//! HTTP, and keeps each user's committed registry in SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalist_ai::extractors::{CatalogueExtractor, GeminiClient, UnconfiguredExtractor};
use catalist_ai::{AppState, ServiceSettings};
use catalist_common::config as common_config;
use catalist_common::events::EventBus;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for catalist-ai
#[derive(Parser, Debug)]
#[command(name = "catalist-ai")]
#[command(about = "Product cataloguing service for Catalist")]
#[command(version)]
struct Args {
    /// Root folder holding catalist.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on (overrides bind_address in the TOML config)
    #[arg(short, long, env = "CATALIST_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = common_config::load_or_default().context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("catalist_ai={0},catalist_common={0},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting catalist-ai v{}", env!("CARGO_PKG_VERSION"));

    // Root folder: CLI → ENV → TOML → OS default
    let root_folder = common_config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    common_config::ensure_root_folder(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    let db_path = common_config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = catalist_ai::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let extractor: Arc<dyn CatalogueExtractor> =
        match catalist_ai::config::resolve_gemini_api_key(&db_pool, &toml_config).await {
            Ok(key) => Arc::new(
                GeminiClient::new(key, toml_config.gemini_model.clone())
                    .context("Failed to build Gemini client")?,
            ),
            Err(e) => {
                warn!("{}", e);
                warn!("Extraction disabled until an API key is configured");
                Arc::new(UnconfiguredExtractor)
            }
        };
    info!(extractor = extractor.name(), model = %toml_config.gemini_model, "Extraction collaborator ready");

    let event_bus = EventBus::new(100);

    let settings = ServiceSettings::from_toml(&toml_config, common_config::config_file_path());
    let state = AppState::new(db_pool, event_bus, extractor, settings);
    let app = catalist_ai::build_router(state);

    let bind_address = args.bind.unwrap_or_else(|| toml_config.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
