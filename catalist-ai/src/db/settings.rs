//! Settings database operations
//!
//! Key-value accessors over the `settings` table.

use catalist_common::{Error, Result};
use sqlx::{Pool, Sqlite};

#[cfg(test)]
use sqlx::SqlitePool;

const GEMINI_API_KEY: &str = "gemini_api_key";

/// Get Gemini API key from database
///
/// **Returns:** Some(key) if exists, None if not set
pub async fn get_gemini_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, GEMINI_API_KEY).await
}

/// Set Gemini API key in database
pub async fn set_gemini_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, GEMINI_API_KEY, key).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            "CREATE TABLE settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_get_gemini_api_key_not_exists() {
        let pool = setup_test_db().await;
        assert_eq!(get_gemini_api_key(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_gemini_api_key_update() {
        let pool = setup_test_db().await;

        set_gemini_api_key(&pool, "old_key".to_string()).await.unwrap();
        set_gemini_api_key(&pool, "new_key".to_string()).await.unwrap();

        let result = get_gemini_api_key(&pool).await.unwrap();
        assert_eq!(result, Some("new_key".to_string()));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'gemini_api_key'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_typed_setting_parse_failure() {
        let pool = setup_test_db().await;
        set_setting(&pool, "history_depth", "many").await.unwrap();

        let result = get_setting::<usize>(&pool, "history_depth").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
