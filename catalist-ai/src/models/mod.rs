//! Data models for catalist-ai

pub mod entity;

pub use entity::{
    AttributeGroup, CatalogueEntity, CoreInfo, EntityPatch, EntitySource, EntityStatus,
    GroundingSource, ProductAttribute, SeoInfo, SourceType, Taxonomy,
};
