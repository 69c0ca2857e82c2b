//! Gemini API key resolution tests
//!
//! Tests that touch CATALIST_GEMINI_API_KEY are marked #[serial] so they
//! never race on the process environment.

mod helpers;

use catalist_ai::config::{resolve_gemini_api_key, GEMINI_API_KEY_ENV};
use catalist_ai::db::settings::set_gemini_api_key;
use catalist_common::config::TomlConfig;
use catalist_common::Error;
use helpers::create_memory_db;
use serial_test::serial;

fn toml_with_key(key: Option<&str>) -> TomlConfig {
    TomlConfig {
        gemini_api_key: key.map(str::to_string),
        ..TomlConfig::default()
    }
}

#[tokio::test]
#[serial]
async fn test_database_overrides_env_and_toml() {
    let pool = create_memory_db().await;
    set_gemini_api_key(&pool, "db-key".to_string()).await.unwrap();
    std::env::set_var(GEMINI_API_KEY_ENV, "env-key");

    let result = resolve_gemini_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(result, "db-key");

    std::env::remove_var(GEMINI_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_env_fallback_when_database_empty() {
    let pool = create_memory_db().await;
    std::env::set_var(GEMINI_API_KEY_ENV, "env-key");

    let result = resolve_gemini_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(result, "env-key");

    std::env::remove_var(GEMINI_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_toml_fallback_and_whitespace_ignored() {
    let pool = create_memory_db().await;
    set_gemini_api_key(&pool, "   ".to_string()).await.unwrap();
    std::env::set_var(GEMINI_API_KEY_ENV, "");

    let result = resolve_gemini_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(result, "toml-key");

    std::env::remove_var(GEMINI_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_missing_everywhere_lists_all_sources() {
    let pool = create_memory_db().await;
    std::env::remove_var(GEMINI_API_KEY_ENV);

    let err = resolve_gemini_api_key(&pool, &toml_with_key(None))
        .await
        .unwrap_err();

    match err {
        Error::Config(message) => {
            assert!(message.contains("/api/settings/gemini_api_key"));
            assert!(message.contains(GEMINI_API_KEY_ENV));
            assert!(message.contains("catalist.toml"));
        }
        other => panic!("expected config error, got {:?}", other),
    }
}
