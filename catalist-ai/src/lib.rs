//! catalist-ai library interface
//!
//! Product cataloguing service: ingest uploads through a hosted model,
//! review the pending batch with undo/redo, and commit entities to a
//! per-user registry. Exposes public APIs for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extractors;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod registry;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use catalist_common::config::TomlConfig;
use catalist_common::events::EventBus;
use chrono::{DateTime, Utc};
use extractors::CatalogueExtractor;
use pipeline::BatchPipeline;
use registry::RegistryStore;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Tunables fixed at startup
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub history_depth: usize,
    pub max_csv_rows: usize,
    pub retention_days: i64,
    pub gemini_model: String,
    /// TOML file that settings updates are mirrored to; None disables sync
    pub toml_path: Option<PathBuf>,
}

impl ServiceSettings {
    pub fn from_toml(config: &TomlConfig, toml_path: Option<PathBuf>) -> Self {
        Self {
            history_depth: config.history_depth,
            max_csv_rows: config.max_csv_rows,
            retention_days: config.retention_days,
            gemini_model: config.gemini_model.clone(),
            toml_path,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default(), None)
    }
}

/// Shared handle to a user's pending batch
pub type SharedPipeline = Arc<Mutex<BatchPipeline>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Active extraction collaborator; replaced when an API key is set
    pub extractor: Arc<RwLock<Arc<dyn CatalogueExtractor>>>,
    /// Pending batches keyed by user
    pub sessions: Arc<RwLock<HashMap<String, SharedPipeline>>>,
    pub registry: RegistryStore,
    /// Serializes registry load-modify-save cycles
    pub registry_guard: Arc<Mutex<()>>,
    pub settings: Arc<ServiceSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        extractor: Arc<dyn CatalogueExtractor>,
        settings: ServiceSettings,
    ) -> Self {
        let registry = RegistryStore::new(db.clone(), settings.retention_days);
        Self {
            db,
            event_bus,
            extractor: Arc::new(RwLock::new(extractor)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            registry,
            registry_guard: Arc::new(Mutex::new(())),
            settings: Arc::new(settings),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// The user's pending batch, created empty on first use
    pub async fn pipeline_for(&self, user: &str) -> SharedPipeline {
        if let Some(pipeline) = self.sessions.read().await.get(user) {
            return Arc::clone(pipeline);
        }

        let mut sessions = self.sessions.write().await;
        let depth = self.settings.history_depth;
        Arc::clone(sessions.entry(user.to_string()).or_insert_with(|| {
            tracing::debug!(user = %user, "Creating pending batch");
            Arc::new(Mutex::new(BatchPipeline::new(depth)))
        }))
    }

    pub async fn current_extractor(&self) -> Arc<dyn CatalogueExtractor> {
        Arc::clone(&*self.extractor.read().await)
    }

    pub async fn set_extractor(&self, extractor: Arc<dyn CatalogueExtractor>) {
        tracing::info!(extractor = extractor.name(), "Extraction collaborator replaced");
        *self.extractor.write().await = extractor;
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::review_routes())
        .merge(api::registry_routes())
        .merge(api::settings_routes())
        .merge(api::event_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
