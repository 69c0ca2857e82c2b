//! Database and app-state test utilities

use anyhow::Result;
use catalist_ai::extractors::CatalogueExtractor;
use catalist_ai::{AppState, ServiceSettings};
use catalist_common::events::EventBus;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Single-connection in-memory database with tables created
///
/// One connection only: each new `:memory:` connection is a fresh database.
pub async fn create_memory_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    catalist_ai::db::init_tables(&pool)
        .await
        .expect("Failed to initialize tables");
    pool
}

/// File-backed database in a temp dir
///
/// Returns (TempDir, SqlitePool); TempDir must be kept alive for the test.
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_catalist.db");
    let pool = catalist_ai::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// App state over an in-memory database with default settings
pub async fn test_app_state(extractor: Arc<dyn CatalogueExtractor>) -> (AppState, SqlitePool) {
    let pool = create_memory_db().await;
    let state = AppState::new(
        pool.clone(),
        EventBus::new(100),
        extractor,
        ServiceSettings::default(),
    );
    (state, pool)
}
