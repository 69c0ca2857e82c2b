//! Catalogue entity data model
//!
//! JSON field names are camelCase so persisted registries and API payloads
//! stay readable by the browser front-end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Placeholder for taxonomy and descriptive fields the model left empty
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for display name and brand
pub const UNKNOWN: &str = "Unknown";

/// Closed set of attribute groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeGroup {
    Core,
    #[serde(rename = "SEO")]
    Seo,
    Technical,
    Legal,
    Dimensions,
    Nutritional,
    Logistics,
    Usage,
    Safety,
    Marketing,
}

impl AttributeGroup {
    /// All groups in display order
    pub const ALL: [AttributeGroup; 10] = [
        AttributeGroup::Core,
        AttributeGroup::Seo,
        AttributeGroup::Technical,
        AttributeGroup::Legal,
        AttributeGroup::Dimensions,
        AttributeGroup::Nutritional,
        AttributeGroup::Logistics,
        AttributeGroup::Usage,
        AttributeGroup::Safety,
        AttributeGroup::Marketing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeGroup::Core => "Core",
            AttributeGroup::Seo => "SEO",
            AttributeGroup::Technical => "Technical",
            AttributeGroup::Legal => "Legal",
            AttributeGroup::Dimensions => "Dimensions",
            AttributeGroup::Nutritional => "Nutritional",
            AttributeGroup::Logistics => "Logistics",
            AttributeGroup::Usage => "Usage",
            AttributeGroup::Safety => "Safety",
            AttributeGroup::Marketing => "Marketing",
        }
    }

    /// Exact (case-sensitive) match against the canonical label
    pub fn from_canonical(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == label)
    }
}

impl fmt::Display for AttributeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text product classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomy {
    pub segment: String,
    pub product_type: String,
    pub category: String,
    pub sub_category: String,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            segment: NOT_AVAILABLE.to_string(),
            product_type: NOT_AVAILABLE.to_string(),
            category: NOT_AVAILABLE.to_string(),
            sub_category: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Canonical display fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreInfo {
    pub display_name: String,
    pub brand: String,
    pub quantity: String,
    pub color: String,
}

impl Default for CoreInfo {
    fn default() -> Self {
        Self {
            display_name: UNKNOWN.to_string(),
            brand: UNKNOWN.to_string(),
            quantity: NOT_AVAILABLE.to_string(),
            color: NOT_AVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoInfo {
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub product_notion: String,
    pub occasion_relevance: String,
}

impl Default for SeoInfo {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            tags: Vec::new(),
            product_notion: NOT_AVAILABLE.to_string(),
            occasion_relevance: NOT_AVAILABLE.to_string(),
        }
    }
}

/// One extracted data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub value: String,
    /// Ratio in [0, 1]
    pub confidence: f64,
    pub group: AttributeGroup,
}

impl ProductAttribute {
    /// Confidence as a whole percentage, for display only
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Completed,
    Failed,
}

/// Which ingest path produced an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Images and/or PDP URLs extracted together
    Composite,
    /// One row of an uploaded CSV
    Csv,
}

/// Citation returned alongside an extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Where an entity came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySource {
    pub source_type: SourceType,
    pub label: String,
}

impl EntitySource {
    pub fn composite(label: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Composite,
            label: label.into(),
        }
    }

    pub fn csv_row(row_number: usize) -> Self {
        Self {
            source_type: SourceType::Csv,
            label: format!("Row {}", row_number),
        }
    }
}

/// One product's structured catalogue record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueEntity {
    pub id: Uuid,
    pub taxonomy: Taxonomy,
    pub core_info: CoreInfo,
    pub seo_info: SeoInfo,
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub insights: String,
    /// Normalized to [0, 100]
    pub data_density: u8,
    /// Normalized to [0, 100]
    pub quality_score: u8,
    pub is_food: bool,
    pub source_type: SourceType,
    pub source_value: String,
    pub status: EntityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_sources: Option<Vec<GroundingSource>>,
    /// Set when the entity is committed to the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CatalogueEntity {
    /// Structurally valid entity with every field at its placeholder
    pub fn placeholder(source: &EntitySource) -> Self {
        Self {
            id: Uuid::new_v4(),
            taxonomy: Taxonomy::default(),
            core_info: CoreInfo::default(),
            seo_info: SeoInfo::default(),
            attributes: Vec::new(),
            insights: String::new(),
            data_density: 0,
            quality_score: 0,
            is_food: false,
            source_type: source.source_type,
            source_value: source.label.clone(),
            status: EntityStatus::Completed,
            source_images: None,
            fallback_image_url: None,
            brand_logo_url: None,
            grounding_sources: None,
            created_at: None,
        }
    }

    /// Attributes belonging to one group, in extraction order
    pub fn attributes_in(&self, group: AttributeGroup) -> impl Iterator<Item = &ProductAttribute> {
        self.attributes.iter().filter(move |a| a.group == group)
    }

    /// Copy without embedded image payloads, for persistence and prompts
    pub fn without_source_images(&self) -> Self {
        Self {
            source_images: None,
            ..self.clone()
        }
    }

    /// Merge a refinement result onto this entity
    ///
    /// Present fields replace the current value wholesale (nested objects
    /// are not deep-merged). Identity and commit time are never touched.
    pub fn apply_patch(&mut self, patch: EntityPatch) {
        let EntityPatch {
            taxonomy,
            core_info,
            seo_info,
            attributes,
            insights,
            data_density,
            quality_score,
            is_food,
            fallback_image_url,
            brand_logo_url,
            grounding_sources,
        } = patch;

        if let Some(v) = taxonomy {
            self.taxonomy = v;
        }
        if let Some(v) = core_info {
            self.core_info = v;
        }
        if let Some(v) = seo_info {
            self.seo_info = v;
        }
        if let Some(v) = attributes {
            self.attributes = v;
        }
        if let Some(v) = insights {
            self.insights = v;
        }
        if let Some(v) = data_density {
            self.data_density = v;
        }
        if let Some(v) = quality_score {
            self.quality_score = v;
        }
        if let Some(v) = is_food {
            self.is_food = v;
        }
        if let Some(v) = fallback_image_url {
            self.fallback_image_url = Some(v);
        }
        if let Some(v) = brand_logo_url {
            self.brand_logo_url = Some(v);
        }
        if let Some(v) = grounding_sources {
            self.grounding_sources = Some(v);
        }
    }
}

/// Partial entity returned by a refinement, already normalized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub taxonomy: Option<Taxonomy>,
    pub core_info: Option<CoreInfo>,
    pub seo_info: Option<SeoInfo>,
    pub attributes: Option<Vec<ProductAttribute>>,
    pub insights: Option<String>,
    pub data_density: Option<u8>,
    pub quality_score: Option<u8>,
    pub is_food: Option<bool>,
    pub fallback_image_url: Option<String>,
    pub brand_logo_url: Option<String>,
    pub grounding_sources: Option<Vec<GroundingSource>>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        *self == EntityPatch::default()
    }
}
