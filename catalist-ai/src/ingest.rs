//! Ingest runner
//!
//! Turns one upload (images, product-page URLs, an optional CSV) into
//! normalized entities. Images and URLs form a single composite extraction;
//! each CSV row is extracted on its own. Calls run one after another and a
//! failed call is recorded without stopping the rest of the batch.

use crate::extractors::{CatalogueExtractor, ExtractionInput};
use crate::models::{CatalogueEntity, EntitySource};
use crate::normalizer::normalize_entity;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Uploaded image, either raw base64 or a `data:` URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl ImageUpload {
    /// Base64 body without any `data:...;base64,` prefix
    pub fn base64_payload(&self) -> &str {
        match self.data.split_once(";base64,") {
            Some((prefix, body)) if prefix.starts_with("data:") => body,
            _ => self.data.as_str(),
        }
    }

    /// Explicit MIME type, else the one in the data URL, else JPEG
    pub fn resolved_mime_type(&self) -> String {
        if let Some(mime) = self.mime_type.as_deref().filter(|m| !m.trim().is_empty()) {
            return mime.to_string();
        }
        self.data
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(mime, _)| mime.to_string())
            .filter(|mime| !mime.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
    }

    /// Image as a `data:` URL, the form kept on the entity for preview
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.resolved_mime_type(), self.base64_payload())
    }

    fn validate(&self) -> Result<(), IngestError> {
        let payload = self.base64_payload().trim();
        if payload.is_empty() {
            return Err(IngestError::InvalidImage {
                name: self.name.clone(),
                reason: "image data is empty".to_string(),
            });
        }
        STANDARD
            .decode(payload)
            .map_err(|e| IngestError::InvalidImage {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// One ingest upload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub images: Vec<ImageUpload>,
    #[serde(default)]
    pub urls: Vec<String>,
    /// Raw CSV text, one product per non-blank line
    #[serde(default)]
    pub csv: Option<String>,
}

impl IngestRequest {
    fn urls(&self) -> Vec<&str> {
        self.urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

/// An item whose extraction failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub label: String,
    pub message: String,
}

/// Outcome of one ingest run
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Successful entities in arrival order
    pub entities: Vec<CatalogueEntity>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn attempted(&self) -> usize {
        self.entities.len() + self.failures.len()
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Nothing to ingest: provide at least one image, URL, or CSV row")]
    NoInputs,

    #[error("Image '{name}' is not valid base64: {reason}")]
    InvalidImage { name: String, reason: String },
}

/// Non-blank CSV lines, trimmed, at most `max_rows`
pub fn parse_csv_rows(text: &str, max_rows: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_rows)
        .map(str::to_string)
        .collect()
}

/// Run every extraction for one upload
///
/// # Errors
/// `NoInputs` when the request carries nothing to extract and
/// `InvalidImage` when an upload is not decodable. Extraction failures are
/// not errors; they land in `IngestReport::failures`.
pub async fn run_ingest<E>(
    extractor: &E,
    request: &IngestRequest,
    max_csv_rows: usize,
) -> Result<IngestReport, IngestError>
where
    E: CatalogueExtractor + ?Sized,
{
    for image in &request.images {
        image.validate()?;
    }

    let urls = request.urls();
    let rows = request
        .csv
        .as_deref()
        .map(|text| parse_csv_rows(text, max_csv_rows))
        .unwrap_or_default();

    if request.images.is_empty() && urls.is_empty() && rows.is_empty() {
        return Err(IngestError::NoInputs);
    }

    tracing::info!(
        extractor = extractor.name(),
        images = request.images.len(),
        urls = urls.len(),
        csv_rows = rows.len(),
        "Starting ingest"
    );

    let mut report = IngestReport::default();

    if !request.images.is_empty() || !urls.is_empty() {
        let label = request
            .images
            .first()
            .map(|img| img.name.clone())
            .or_else(|| urls.first().map(|u| u.to_string()))
            .unwrap_or_default();

        let mut inputs: Vec<ExtractionInput> = request
            .images
            .iter()
            .map(|img| ExtractionInput::image(img.base64_payload(), img.resolved_mime_type()))
            .collect();
        inputs.extend(urls.iter().map(|u| ExtractionInput::url(*u)));

        let source = EntitySource::composite(label);
        match extract_one(extractor, &inputs, &source).await {
            Ok(mut entity) => {
                if !request.images.is_empty() {
                    entity.source_images =
                        Some(request.images.iter().map(ImageUpload::data_url).collect());
                }
                report.entities.push(entity);
            }
            Err(message) => report.failures.push(IngestFailure {
                label: source.label,
                message,
            }),
        }
    }

    for (i, row) in rows.iter().enumerate() {
        let source = EntitySource::csv_row(i + 1);
        let inputs = [ExtractionInput::text(row.as_str())];

        match extract_one(extractor, &inputs, &source).await {
            Ok(entity) => report.entities.push(entity),
            Err(message) => report.failures.push(IngestFailure {
                label: source.label,
                message,
            }),
        }
    }

    tracing::info!(
        succeeded = report.entities.len(),
        failed = report.failures.len(),
        "Ingest finished"
    );

    Ok(report)
}

async fn extract_one<E>(
    extractor: &E,
    inputs: &[ExtractionInput],
    source: &EntitySource,
) -> Result<CatalogueEntity, String>
where
    E: CatalogueExtractor + ?Sized,
{
    match extractor.extract(inputs, &source.label).await {
        Ok(raw) => {
            let mut entity = normalize_entity(&raw.payload, source);
            if !raw.grounding_sources.is_empty() {
                entity.grounding_sources = Some(raw.grounding_sources);
            }
            tracing::debug!(label = %source.label, entity_id = %entity.id, "Extraction normalized");
            Ok(entity)
        }
        Err(e) => {
            tracing::warn!(label = %source.label, error = %e, "Extraction failed; skipping item");
            Err(e.to_string())
        }
    }
}
