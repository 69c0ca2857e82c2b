//! Entity normalizer
//!
//! Turns loosely-typed model output into a structurally valid
//! `CatalogueEntity`. Normalization never fails: missing or malformed
//! fields fall back to placeholders and the entity simply scores low.
//!
//! Scores arrive either as ratios in [0, 1] or as percentages; both map to
//! an integer in [0, 100]. Attribute group labels are free text and are
//! coerced into the closed `AttributeGroup` set.

use crate::models::{
    AttributeGroup, CatalogueEntity, CoreInfo, EntityPatch, EntitySource, GroundingSource,
    ProductAttribute, SeoInfo, Taxonomy,
};
use crate::models::entity::{NOT_AVAILABLE, UNKNOWN};
use serde_json::{Map, Value};

/// Attribute name used when the model omits one
const UNNAMED_ATTRIBUTE: &str = "Unnamed";

/// Lower-case keyword fragments per group, checked in order; first hit wins
const GROUP_KEYWORDS: &[(&[&str], AttributeGroup)] = &[
    (&["nutri", "ingredient", "allergen", "calor"], AttributeGroup::Nutritional),
    (&["legal", "regul", "certif", "complian"], AttributeGroup::Legal),
    (&["seo", "keyword", "search"], AttributeGroup::Seo),
    (&["dimen", "size", "weight", "measure"], AttributeGroup::Dimensions),
    (&["logist", "shipping", "packag", "storage"], AttributeGroup::Logistics),
    (&["safety", "hazard", "warning"], AttributeGroup::Safety),
    (&["usage", "use", "instruction", "care"], AttributeGroup::Usage),
    (&["market", "brand", "position", "audience"], AttributeGroup::Marketing),
    (&["core", "identity", "basic", "general"], AttributeGroup::Core),
    (&["tech", "spec", "material"], AttributeGroup::Technical),
];

/// Keywords that only count as whole words ("use" is not "warehouse")
const WHOLE_WORD_KEYWORDS: &[&str] = &["use"];

fn mentions(label: &str, keyword: &str) -> bool {
    if WHOLE_WORD_KEYWORDS.contains(&keyword) {
        label
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    } else {
        label.contains(keyword)
    }
}

/// Map a raw score onto [0, 100]
///
/// Values in [0, 1] are treated as ratios, anything larger as a
/// percentage capped at 100. Negative and non-finite input scores 0.
pub fn normalize_score(value: f64) -> u8 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    if value <= 1.0 {
        (value * 100.0).round() as u8
    } else {
        value.round().min(100.0) as u8
    }
}

/// Map a raw confidence onto a ratio in [0, 1]
pub fn normalize_confidence(value: f64) -> f64 {
    f64::from(normalize_score(value)) / 100.0
}

/// Coerce a free-text group label into the closed set
pub fn canonicalize_group(raw: &str) -> AttributeGroup {
    if let Some(group) = AttributeGroup::from_canonical(raw) {
        return group;
    }

    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return AttributeGroup::Technical;
    }

    GROUP_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| mentions(&lowered, k)))
        .map(|(_, group)| *group)
        .unwrap_or(AttributeGroup::Technical)
}

/// Build a full entity from raw extraction output
///
/// A fresh id is assigned. `source_images`, `grounding_sources` and
/// `created_at` are left for the caller.
pub fn normalize_entity(raw: &Value, source: &EntitySource) -> CatalogueEntity {
    let mut entity = CatalogueEntity::placeholder(source);

    let Some(obj) = raw.as_object() else {
        tracing::debug!(label = %source.label, "Extraction output is not an object; using placeholders");
        return entity;
    };

    if let Some(v) = obj.get("taxonomy") {
        entity.taxonomy = normalize_taxonomy(v);
    }
    if let Some(v) = obj.get("coreInfo") {
        entity.core_info = normalize_core_info(v);
    }
    if let Some(v) = obj.get("seoInfo") {
        entity.seo_info = normalize_seo_info(v);
    }
    if let Some(v) = obj.get("attributes") {
        entity.attributes = normalize_attributes(v);
    }
    if let Some(v) = obj.get("insights") {
        entity.insights = text_or(v, "");
    }
    entity.data_density = score_field(obj, "dataDensity").unwrap_or(0);
    entity.quality_score = score_field(obj, "qualityScore").unwrap_or(0);
    entity.is_food = obj.get("isFood").and_then(as_bool).unwrap_or(false);
    entity.fallback_image_url = obj.get("fallbackImageUrl").and_then(non_empty_text);
    entity.brand_logo_url = obj.get("brandLogoUrl").and_then(non_empty_text);

    entity
}

/// Normalize a partial refinement result
///
/// Only keys present in `raw` produce `Some`. Identity, status, source and
/// commit-time fields are ignored even if the model echoes them back.
pub fn normalize_patch(raw: &Value) -> EntityPatch {
    let Some(obj) = raw.as_object() else {
        return EntityPatch::default();
    };

    EntityPatch {
        taxonomy: obj.get("taxonomy").map(normalize_taxonomy),
        core_info: obj.get("coreInfo").map(normalize_core_info),
        seo_info: obj.get("seoInfo").map(normalize_seo_info),
        attributes: obj.get("attributes").map(normalize_attributes),
        insights: obj.get("insights").map(|v| text_or(v, "")),
        data_density: score_field(obj, "dataDensity"),
        quality_score: score_field(obj, "qualityScore"),
        is_food: obj.get("isFood").and_then(as_bool),
        fallback_image_url: obj.get("fallbackImageUrl").and_then(non_empty_text),
        brand_logo_url: obj.get("brandLogoUrl").and_then(non_empty_text),
        grounding_sources: obj.get("groundingSources").map(normalize_grounding_sources),
    }
}

/// Citation records from either `{uri, title}` or `{web: {uri, title}}`
pub fn normalize_grounding_sources(raw: &Value) -> Vec<GroundingSource> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let record = item.get("web").unwrap_or(item);
            let uri = record.get("uri").and_then(non_empty_text)?;
            Some(GroundingSource {
                uri,
                title: record.get("title").and_then(non_empty_text),
            })
        })
        .collect()
}

fn normalize_taxonomy(raw: &Value) -> Taxonomy {
    Taxonomy {
        segment: field_text(raw, "segment", NOT_AVAILABLE),
        product_type: field_text(raw, "productType", NOT_AVAILABLE),
        category: field_text(raw, "category", NOT_AVAILABLE),
        sub_category: field_text(raw, "subCategory", NOT_AVAILABLE),
    }
}

fn normalize_core_info(raw: &Value) -> CoreInfo {
    CoreInfo {
        display_name: field_text(raw, "displayName", UNKNOWN),
        brand: field_text(raw, "brand", UNKNOWN),
        quantity: field_text(raw, "quantity", NOT_AVAILABLE),
        color: field_text(raw, "color", NOT_AVAILABLE),
    }
}

fn normalize_seo_info(raw: &Value) -> SeoInfo {
    SeoInfo {
        keywords: raw.get("keywords").map(text_list).unwrap_or_default(),
        tags: raw.get("tags").map(text_list).unwrap_or_default(),
        product_notion: field_text(raw, "productNotion", NOT_AVAILABLE),
        occasion_relevance: field_text(raw, "occasionRelevance", NOT_AVAILABLE),
    }
}

fn normalize_attributes(raw: &Value) -> Vec<ProductAttribute> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| ProductAttribute {
            name: field_text(item, "name", UNNAMED_ATTRIBUTE),
            value: item.get("value").map(|v| text_or(v, "")).unwrap_or_default(),
            confidence: item
                .get("confidence")
                .and_then(as_number)
                .map(normalize_confidence)
                .unwrap_or(0.0),
            group: canonicalize_group(
                item.get("group").and_then(Value::as_str).unwrap_or_default(),
            ),
        })
        .collect()
}

fn score_field(obj: &Map<String, Value>, key: &str) -> Option<u8> {
    obj.get(key).and_then(as_number).map(normalize_score)
}

fn field_text(raw: &Value, key: &str, default: &str) -> String {
    raw.get(key)
        .map(|v| text_or(v, default))
        .unwrap_or_else(|| default.to_string())
}

/// Render a scalar (or list of scalars) as text; blank falls back to `default`
fn text_or(value: &Value, default: &str) -> String {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|v| text_or(v, ""))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => String::new(),
    };

    if text.is_empty() {
        default.to_string()
    } else {
        text
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    let text = text_or(value, "");
    (!text.is_empty()).then_some(text)
}

/// Arrays of scalars, or a single comma-separated string
fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(non_empty_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityStatus, SourceType};
    use serde_json::json;

    #[test]
    fn test_score_ratio_and_percentage_inputs() {
        assert_eq!(normalize_score(0.0), 0);
        assert_eq!(normalize_score(0.42), 42);
        assert_eq!(normalize_score(1.0), 100);
        assert_eq!(normalize_score(1.4), 1);
        assert_eq!(normalize_score(73.6), 74);
        assert_eq!(normalize_score(250.0), 100);
    }

    #[test]
    fn test_score_rejects_negative_and_nan() {
        assert_eq!(normalize_score(-5.0), 0);
        assert_eq!(normalize_score(f64::NAN), 0);
        assert_eq!(normalize_score(f64::INFINITY), 0);
    }

    #[test]
    fn test_score_idempotent_on_integer_percentages() {
        for v in 0..=100u8 {
            let once = normalize_score(f64::from(v));
            let twice = normalize_score(f64::from(once));
            assert_eq!(once, twice, "v={}", v);
        }
    }

    #[test]
    fn test_confidence_stays_a_ratio() {
        assert_eq!(normalize_confidence(0.85), 0.85);
        assert_eq!(normalize_confidence(85.0), 0.85);
        assert_eq!(normalize_confidence(400.0), 1.0);
    }

    #[test]
    fn test_group_canonicalization() {
        assert_eq!(canonicalize_group("nutrition facts"), AttributeGroup::Nutritional);
        assert_eq!(canonicalize_group("REGULATORY"), AttributeGroup::Legal);
        assert_eq!(canonicalize_group(""), AttributeGroup::Technical);
    }

    #[test]
    fn test_group_exact_match_and_fallback() {
        assert_eq!(canonicalize_group("SEO"), AttributeGroup::Seo);
        assert_eq!(canonicalize_group("Shipping info"), AttributeGroup::Logistics);
        assert_eq!(canonicalize_group("Product Size"), AttributeGroup::Dimensions);
        assert_eq!(canonicalize_group("Brand Story"), AttributeGroup::Marketing);
        assert_eq!(canonicalize_group("Misc"), AttributeGroup::Technical);
    }

    #[test]
    fn test_group_use_matches_whole_word_only() {
        assert_eq!(canonicalize_group("Intended use"), AttributeGroup::Usage);
        assert_eq!(canonicalize_group("use-by"), AttributeGroup::Usage);
        assert_eq!(canonicalize_group("Warehouse"), AttributeGroup::Technical);
    }

    #[test]
    fn test_normalize_full_entity() {
        let raw = json!({
            "taxonomy": {"segment": "Home", "productType": "Appliance", "category": "Kitchen", "subCategory": "Kettles"},
            "coreInfo": {"displayName": "Steel Kettle", "brand": "Acme", "quantity": "1", "color": "Silver"},
            "seoInfo": {"keywords": ["kettle", "steel"], "tags": "boil, tea", "productNotion": "Fast boil", "occasionRelevance": "Daily"},
            "attributes": [
                {"name": "Capacity", "value": "1.7 L", "confidence": 0.9, "group": "Dimensions"},
                {"name": "Wattage", "value": 2200, "confidence": 95, "group": "tech specs"},
                "not an attribute"
            ],
            "insights": "Popular",
            "isFood": false,
            "dataDensity": 0.8,
            "qualityScore": 91,
            "brandLogoUrl": "https://acme.example/logo.png"
        });

        let entity = normalize_entity(&raw, &EntitySource::composite("kettle.jpg"));

        assert_eq!(entity.taxonomy.sub_category, "Kettles");
        assert_eq!(entity.core_info.display_name, "Steel Kettle");
        assert_eq!(entity.seo_info.tags, vec!["boil", "tea"]);
        assert_eq!(entity.attributes.len(), 2);
        assert_eq!(entity.attributes[1].value, "2200");
        assert_eq!(entity.attributes[1].confidence, 0.95);
        assert_eq!(entity.attributes[1].group, AttributeGroup::Technical);
        assert_eq!(entity.data_density, 80);
        assert_eq!(entity.quality_score, 91);
        assert_eq!(entity.source_type, SourceType::Composite);
        assert_eq!(entity.source_value, "kettle.jpg");
        assert_eq!(entity.status, EntityStatus::Completed);
        assert!(entity.fallback_image_url.is_none());
        assert!(entity.created_at.is_none());
    }

    #[test]
    fn test_missing_sub_objects_get_placeholders() {
        let entity = normalize_entity(&json!({"attributes": "garbage"}), &EntitySource::csv_row(3));

        assert_eq!(entity.core_info.display_name, "Unknown");
        assert_eq!(entity.taxonomy.category, "N/A");
        assert_eq!(entity.seo_info.product_notion, "N/A");
        assert!(entity.attributes.is_empty());
        assert_eq!(entity.quality_score, 0);
        assert_eq!(entity.source_value, "Row 3");
    }

    #[test]
    fn test_non_object_input_never_fails() {
        let entity = normalize_entity(&json!("oops"), &EntitySource::csv_row(1));
        assert_eq!(entity.core_info.brand, "Unknown");

        let entity = normalize_entity(&Value::Null, &EntitySource::csv_row(1));
        assert!(entity.attributes.is_empty());
    }

    #[test]
    fn test_patch_only_carries_present_fields() {
        let patch = normalize_patch(&json!({
            "id": "should-be-ignored",
            "qualityScore": 0.5,
            "attributes": [{"name": "Allergens", "value": "Nuts", "confidence": 1, "group": "allergen info"}]
        }));

        assert_eq!(patch.quality_score, Some(50));
        assert!(patch.core_info.is_none());
        assert!(patch.data_density.is_none());
        let attrs = patch.attributes.unwrap();
        assert_eq!(attrs[0].group, AttributeGroup::Nutritional);
        assert_eq!(attrs[0].confidence, 1.0);
    }

    #[test]
    fn test_patch_from_non_object_is_empty() {
        assert!(normalize_patch(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_grounding_sources_both_shapes() {
        let sources = normalize_grounding_sources(&json!([
            {"web": {"uri": "https://a.example", "title": "A"}},
            {"uri": "https://b.example"},
            {"web": {"title": "missing uri"}}
        ]));

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title.as_deref(), Some("A"));
        assert_eq!(sources[1].uri, "https://b.example");
    }
}
