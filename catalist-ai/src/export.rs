//! CSV export and section text
//!
//! Two CSV shapes: a long per-entity sheet (one row per attribute, plus a
//! fixed identity block) and a wide registry sheet (one row per entity).
//! Fields are quoted only when they contain a delimiter, quote, or newline.

use crate::models::{AttributeGroup, CatalogueEntity};
use csv::{QuoteStyle, WriterBuilder};
use thiserror::Error;

const ENTITY_HEADER: [&str; 4] = ["Group", "Attribute", "Value", "Confidence"];

const REGISTRY_HEADER: [&str; 9] = [
    "ID",
    "Display Name",
    "Brand",
    "Category",
    "SubCategory",
    "Data Density",
    "Quality Score",
    "Is Food",
    "Attribute Count",
];

/// Confidence written for the fixed identity rows
const FIXED_ROW_CONFIDENCE: &str = "1.0";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),
}

/// Per-entity attribute sheet
pub fn entity_to_csv(entity: &CatalogueEntity) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(ENTITY_HEADER)?;

    let fixed = [
        ("Core", "Display Name", entity.core_info.display_name.as_str()),
        ("Core", "Brand", entity.core_info.brand.as_str()),
        ("Taxonomy", "Category", entity.taxonomy.category.as_str()),
        ("SEO", "Product Notion", entity.seo_info.product_notion.as_str()),
    ];
    for (group, name, value) in fixed {
        writer.write_record([group, name, value, FIXED_ROW_CONFIDENCE])?;
    }

    for attr in &entity.attributes {
        let confidence = attr.confidence.to_string();
        writer.write_record([
            attr.group.as_str(),
            attr.name.as_str(),
            attr.value.as_str(),
            confidence.as_str(),
        ])?;
    }

    finish(writer)
}

/// Registry overview sheet, one row per entity in registry order
pub fn registry_to_csv(items: &[CatalogueEntity]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(REGISTRY_HEADER)?;

    for entity in items {
        writer.write_record([
            entity.id.to_string(),
            entity.core_info.display_name.clone(),
            entity.core_info.brand.clone(),
            entity.taxonomy.category.clone(),
            entity.taxonomy.sub_category.clone(),
            format!("{}%", entity.data_density),
            format!("{}%", entity.quality_score),
            entity.is_food.to_string(),
            entity.attributes.len().to_string(),
        ])?;
    }

    finish(writer)
}

/// `name: value` lines for one attribute group, for clipboard copy
pub fn section_text(entity: &CatalogueEntity, group: AttributeGroup) -> String {
    entity
        .attributes_in(group)
        .map(|a| format!("{}: {}", a.name, a.value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))
}
