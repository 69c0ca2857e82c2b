//! Registry table operations
//!
//! Each user's committed entities are stored as one JSON array row,
//! rewritten in full on every save.

use crate::models::CatalogueEntity;
use catalist_common::{Error, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

/// Load a user's persisted entities, or an empty list if none are stored
pub async fn load_items(db: &Pool<Sqlite>, user_key: &str) -> Result<Vec<CatalogueEntity>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT items FROM registry WHERE user_key = ?")
        .bind(user_key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((items,)) => Ok(serde_json::from_str(&items)?),
        None => Ok(Vec::new()),
    }
}

/// Replace a user's persisted entities
pub async fn save_items(
    db: &Pool<Sqlite>,
    user_key: &str,
    items: &[CatalogueEntity],
) -> Result<()> {
    let json = serde_json::to_string(items)?;

    sqlx::query(
        "INSERT INTO registry (user_key, items, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(user_key) DO UPDATE SET items = excluded.items, updated_at = excluded.updated_at",
    )
    .bind(user_key)
    .bind(json)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_user_loads_empty() {
        let pool = setup_test_db().await;
        assert!(load_items(&pool, "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let pool = setup_test_db().await;
        let a = CatalogueEntity::placeholder(&EntitySource::csv_row(1));
        let b = CatalogueEntity::placeholder(&EntitySource::csv_row(2));

        save_items(&pool, "alice", &[a.clone(), b.clone()]).await.unwrap();
        save_items(&pool, "alice", &[b.clone()]).await.unwrap();

        let loaded = load_items(&pool, "alice").await.unwrap();
        assert_eq!(loaded, vec![b]);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registry")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_serialization_error() {
        let pool = setup_test_db().await;
        sqlx::query("INSERT INTO registry (user_key, items, updated_at) VALUES ('bob', 'not json', '')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            load_items(&pool, "bob").await,
            Err(Error::Serialization(_))
        ));
    }
}
