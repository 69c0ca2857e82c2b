//! Registry store persistence tests

mod helpers;

use catalist_ai::models::{CatalogueEntity, EntitySource};
use catalist_ai::registry::{Registry, RegistryStore};
use chrono::{Duration, Utc};
use helpers::{create_memory_db, create_test_db};

fn committed(name: &str, age_days: i64) -> CatalogueEntity {
    let mut e = CatalogueEntity::placeholder(&EntitySource::composite(format!("{}.jpg", name)));
    e.core_info.display_name = name.to_string();
    e.created_at = Some(Utc::now() - Duration::days(age_days));
    e
}

#[tokio::test]
async fn test_save_then_load_round_trip() {
    let pool = create_memory_db().await;
    let store = RegistryStore::new(pool, 15);

    let mut registry = store.load("alice").await.unwrap();
    assert!(registry.is_empty());

    registry.prepend(committed("older", 2));
    registry.prepend(committed("newer", 1));
    store.save(&registry).await.unwrap();

    let loaded = store.load("alice").await.unwrap();
    assert_eq!(loaded.items(), registry.items());
    assert_eq!(loaded.items()[0].core_info.display_name, "newer");
}

#[tokio::test]
async fn test_expiry_window_on_load() {
    let pool = create_memory_db().await;
    let store = RegistryStore::new(pool, 15);

    let registry = Registry::new(
        "bob",
        vec![committed("fourteen", 14), committed("sixteen", 16)],
    );
    store.save(&registry).await.unwrap();

    let loaded = store.load("bob").await.unwrap();
    let names: Vec<_> = loaded
        .items()
        .iter()
        .map(|e| e.core_info.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["fourteen"]);
}

#[tokio::test]
async fn test_load_at_uses_given_clock() {
    let pool = create_memory_db().await;
    let store = RegistryStore::new(pool, 15);
    store
        .save(&Registry::new("carol", vec![committed("today", 0)]))
        .await
        .unwrap();

    let later = Utc::now() + Duration::days(20);
    assert!(store.load_at("carol", later).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_source_images_not_persisted() {
    let pool = create_memory_db().await;
    let store = RegistryStore::new(pool, 15);

    let mut entity = committed("photo", 0);
    entity.source_images = Some(vec!["data:image/png;base64,QUJD".to_string()]);
    store
        .save(&Registry::new("dave", vec![entity.clone()]))
        .await
        .unwrap();

    let loaded = store.load("dave").await.unwrap();
    assert_eq!(loaded.items()[0].id, entity.id);
    assert!(loaded.items()[0].source_images.is_none());
}

#[tokio::test]
async fn test_users_are_isolated() {
    let pool = create_memory_db().await;
    let store = RegistryStore::new(pool, 15);

    store
        .save(&Registry::new("erin", vec![committed("mine", 0)]))
        .await
        .unwrap();

    assert!(store.load("frank").await.unwrap().is_empty());
    assert_eq!(store.load("erin").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_registry_survives_reopen() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let db_path = temp_dir.path().join("test_catalist.db");

    let entity = committed("durable", 3);
    RegistryStore::new(pool.clone(), 15)
        .save(&Registry::new("gina", vec![entity.clone()]))
        .await
        .unwrap();
    pool.close().await;

    let reopened = catalist_ai::db::init_database_pool(&db_path).await.unwrap();
    let loaded = RegistryStore::new(reopened, 15).load("gina").await.unwrap();
    assert_eq!(loaded.items(), &[entity][..]);
}
