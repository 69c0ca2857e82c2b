//! Per-user registry of committed entities
//!
//! `Registry` is the in-memory list (newest first). `RegistryStore` loads
//! and saves it, dropping entities older than the retention window on
//! load. Embedded image payloads are never persisted.

use crate::db;
use crate::models::CatalogueEntity;
use catalist_common::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Committed entities for one user, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    user_key: String,
    items: Vec<CatalogueEntity>,
}

impl Registry {
    pub fn new(user_key: impl Into<String>, items: Vec<CatalogueEntity>) -> Self {
        Self {
            user_key: user_key.into(),
            items,
        }
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn items(&self) -> &[CatalogueEntity] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CatalogueEntity> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&CatalogueEntity> {
        self.items.iter().find(|e| e.id == id)
    }

    /// Insert at the front; duplicates are allowed
    pub fn prepend(&mut self, entity: CatalogueEntity) {
        self.items.insert(0, entity);
    }

    pub fn remove(&mut self, id: Uuid) -> Option<CatalogueEntity> {
        let index = self.items.iter().position(|e| e.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary::from_items(&self.items)
    }
}

/// Aggregate figures over a registry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySummary {
    pub total_entities: usize,
    pub food_entities: usize,
    pub total_attributes: usize,
    /// Mean over entities, 0 when empty
    pub mean_quality_score: f64,
    pub mean_data_density: f64,
}

impl RegistrySummary {
    fn from_items(items: &[CatalogueEntity]) -> Self {
        Self {
            total_entities: items.len(),
            food_entities: items.iter().filter(|e| e.is_food).count(),
            total_attributes: items.iter().map(|e| e.attributes.len()).sum(),
            mean_quality_score: mean_of(items, |e| e.quality_score),
            mean_data_density: mean_of(items, |e| e.data_density),
        }
    }
}

fn mean_of(items: &[CatalogueEntity], score: impl Fn(&CatalogueEntity) -> u8) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|e| f64::from(score(e))).sum::<f64>() / items.len() as f64
}

/// Keep entities younger than `retention`, preserving order
///
/// Entities without a commit timestamp are treated as expired.
pub fn retain_unexpired(
    items: Vec<CatalogueEntity>,
    now: DateTime<Utc>,
    retention: Duration,
) -> Vec<CatalogueEntity> {
    items
        .into_iter()
        .filter(|e| match e.created_at {
            Some(created) => now.signed_duration_since(created) < retention,
            None => false,
        })
        .collect()
}

/// SQLite-backed registry persistence
#[derive(Clone)]
pub struct RegistryStore {
    db: SqlitePool,
    retention: Duration,
}

impl RegistryStore {
    pub fn new(db: SqlitePool, retention_days: i64) -> Self {
        Self {
            db,
            retention: Duration::days(retention_days),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Load a user's registry as of now
    pub async fn load(&self, user_key: &str) -> Result<Registry> {
        self.load_at(user_key, Utc::now()).await
    }

    /// Load a user's registry, expiring against `now`
    pub async fn load_at(&self, user_key: &str, now: DateTime<Utc>) -> Result<Registry> {
        let stored = db::registry::load_items(&self.db, user_key).await?;
        let stored_len = stored.len();
        let items = retain_unexpired(stored, now, self.retention);

        if items.len() < stored_len {
            tracing::info!(
                user = %user_key,
                expired = stored_len - items.len(),
                kept = items.len(),
                "Expired registry entities dropped"
            );
        }

        Ok(Registry::new(user_key, items))
    }

    /// Overwrite the persisted registry with the in-memory one
    pub async fn save(&self, registry: &Registry) -> Result<()> {
        let items: Vec<CatalogueEntity> = registry
            .items()
            .iter()
            .map(CatalogueEntity::without_source_images)
            .collect();

        db::registry::save_items(&self.db, registry.user_key(), &items).await?;

        tracing::debug!(user = %registry.user_key(), items = items.len(), "Registry saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeGroup, EntitySource, ProductAttribute};

    fn committed(name: &str, age_days: i64, now: DateTime<Utc>) -> CatalogueEntity {
        let mut e = CatalogueEntity::placeholder(&EntitySource::composite(name));
        e.core_info.display_name = name.to_string();
        e.created_at = Some(now - Duration::days(age_days));
        e
    }

    #[test]
    fn test_retain_unexpired_boundary() {
        let now = Utc::now();
        let items = vec![
            committed("fresh", 1, now),
            committed("old", 16, now),
            committed("edge", 15, now),
            committed("recent", 14, now),
        ];

        let kept = retain_unexpired(items, now, Duration::days(15));
        let names: Vec<_> = kept.iter().map(|e| e.core_info.display_name.as_str()).collect();
        assert_eq!(names, vec!["fresh", "recent"]);
    }

    #[test]
    fn test_missing_created_at_is_expired() {
        let e = CatalogueEntity::placeholder(&EntitySource::csv_row(1));
        assert!(retain_unexpired(vec![e], Utc::now(), Duration::days(15)).is_empty());
    }

    #[test]
    fn test_prepend_and_remove() {
        let now = Utc::now();
        let mut registry = Registry::new("alice", vec![committed("a", 0, now)]);
        let b = committed("b", 0, now);
        let b_id = b.id;

        registry.prepend(b.clone());
        registry.prepend(b);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.items()[0].id, b_id);

        assert!(registry.remove(b_id).is_some());
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_summary() {
        let now = Utc::now();
        let mut a = committed("a", 0, now);
        a.quality_score = 80;
        a.data_density = 50;
        a.is_food = true;
        a.attributes.push(ProductAttribute {
            name: "Fat".to_string(),
            value: "3g".to_string(),
            confidence: 0.9,
            group: AttributeGroup::Nutritional,
        });
        let mut b = committed("b", 0, now);
        b.quality_score = 60;
        b.data_density = 30;

        let summary = Registry::new("u", vec![a, b]).summary();
        assert_eq!(summary.total_entities, 2);
        assert_eq!(summary.food_entities, 1);
        assert_eq!(summary.total_attributes, 1);
        assert!((summary.mean_quality_score - 70.0).abs() < f64::EPSILON);
        assert!((summary.mean_data_density - 40.0).abs() < f64::EPSILON);

        let empty = Registry::new("u", Vec::new()).summary();
        assert_eq!(empty.mean_quality_score, 0.0);
    }
}
