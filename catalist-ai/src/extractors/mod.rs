//! Extraction collaborators
//!
//! The hosted model sits behind `CatalogueExtractor` so the ingest runner
//! and batch pipeline never depend on a concrete transport. Output is raw
//! JSON; the normalizer turns it into entities.

pub mod gemini_client;

use crate::models::{CatalogueEntity, GroundingSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use gemini_client::GeminiClient;

/// Kind of signal handed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Image,
    Url,
    Text,
}

/// One extraction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionInput {
    pub kind: InputKind,
    /// Base64 image data (no data-URL prefix), a URL, or free text
    pub payload: String,
    /// MIME type, images only
    pub mime_type: Option<String>,
}

impl ExtractionInput {
    pub fn image(base64_data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Image,
            payload: base64_data.into(),
            mime_type: Some(mime_type.into()),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Url,
            payload: url.into(),
            mime_type: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Text,
            payload: text.into(),
            mime_type: None,
        }
    }
}

/// Unnormalized extraction output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtraction {
    /// Model JSON; `{}` when the model returned nothing
    pub payload: Value,
    pub grounding_sources: Vec<GroundingSource>,
}

/// Extraction error
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Model endpoint answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body was not the JSON we asked for
    #[error("Parse error: {0}")]
    Parse(String),

    /// No API key available
    #[error("Extraction service not configured: {0}")]
    NotConfigured(String),
}

/// Hosted model contract
#[async_trait]
pub trait CatalogueExtractor: Send + Sync {
    /// Collaborator name for logs
    fn name(&self) -> &'static str;

    /// Produce one raw entity from any mix of inputs (zero included)
    ///
    /// # Errors
    /// Returns `ExtractionError` on transport or parse failure only;
    /// structurally thin output is still `Ok`.
    async fn extract(
        &self,
        inputs: &[ExtractionInput],
        source_label: &str,
    ) -> Result<RawExtraction, ExtractionError>;

    /// Revise one entity; returns the partial fields to merge
    async fn refine(
        &self,
        entity: &CatalogueEntity,
        instruction: &str,
    ) -> Result<Value, ExtractionError>;
}

/// Stand-in used until an API key is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredExtractor;

const NOT_CONFIGURED_HINT: &str = "Gemini API key not configured. Set it via \
     POST /api/settings/gemini_api_key, CATALIST_GEMINI_API_KEY, or gemini_api_key in catalist.toml";

#[async_trait]
impl CatalogueExtractor for UnconfiguredExtractor {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn extract(
        &self,
        _inputs: &[ExtractionInput],
        _source_label: &str,
    ) -> Result<RawExtraction, ExtractionError> {
        Err(ExtractionError::NotConfigured(NOT_CONFIGURED_HINT.to_string()))
    }

    async fn refine(
        &self,
        _entity: &CatalogueEntity,
        _instruction: &str,
    ) -> Result<Value, ExtractionError> {
        Err(ExtractionError::NotConfigured(NOT_CONFIGURED_HINT.to_string()))
    }
}
