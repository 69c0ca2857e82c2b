//! Gemini API client
//!
//! Sends extraction and refinement requests to the `generateContent`
//! endpoint with JSON output enabled, and maps grounding metadata onto
//! `GroundingSource` records. Requests are rate limited client-side.

use super::{CatalogueExtractor, ExtractionError, ExtractionInput, InputKind, RawExtraction};
use crate::models::CatalogueEntity;
use crate::normalizer::normalize_grounding_sources;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const RATE_LIMIT_MS: u64 = 1000;

const EXTRACTION_PROMPT: &str = "Act as a lead catalogue data scientist. Analyze the provided \
     inputs (images, URLs, text) and return one exhaustive product catalogue object as JSON with \
     keys coreInfo, taxonomy, seoInfo, attributes, isFood, insights, dataDensity, qualityScore, \
     fallbackImageUrl and brandLogoUrl. Group every attribute into one of: Technical, Legal, \
     Nutritional, Marketing, Logistics, Usage, Safety, Dimensions, Core, SEO.";

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ExtractionError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    /// Point the client at a different endpoint root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn generate(&self, body: &Value) -> Result<RawExtraction, ExtractionError> {
        self.rate_limiter.wait().await;

        let url = self.endpoint();
        tracing::debug!(model = %self.model, url = %url, "Calling Gemini generateContent");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        parse_generate_response(&body)
    }
}

#[async_trait]
impl CatalogueExtractor for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn extract(
        &self,
        inputs: &[ExtractionInput],
        source_label: &str,
    ) -> Result<RawExtraction, ExtractionError> {
        tracing::debug!(label = %source_label, inputs = inputs.len(), "Requesting extraction");
        self.generate(&build_extract_request(inputs)).await
    }

    async fn refine(
        &self,
        entity: &CatalogueEntity,
        instruction: &str,
    ) -> Result<Value, ExtractionError> {
        tracing::debug!(entity_id = %entity.id, "Requesting refinement");
        let body = build_refine_request(entity, instruction)?;
        Ok(self.generate(&body).await?.payload)
    }
}

/// Request body for a composite or CSV-row extraction
pub fn build_extract_request(inputs: &[ExtractionInput]) -> Value {
    let mut parts = vec![json!({ "text": EXTRACTION_PROMPT })];

    for input in inputs {
        let part = match input.kind {
            InputKind::Image => json!({
                "inline_data": {
                    "mime_type": input.mime_type.as_deref().unwrap_or("image/jpeg"),
                    "data": input.payload,
                }
            }),
            InputKind::Url => json!({ "text": format!("Source Info (url): {}", input.payload) }),
            InputKind::Text => json!({ "text": format!("Source Info (text): {}", input.payload) }),
        };
        parts.push(part);
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "tools": [{ "google_search": {} }],
        "generationConfig": { "responseMimeType": "application/json" }
    })
}

/// Request body for refining one entity
pub fn build_refine_request(
    entity: &CatalogueEntity,
    instruction: &str,
) -> Result<Value, ExtractionError> {
    let current = serde_json::to_string(&entity.without_source_images())
        .map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let prompt = format!(
        "Review and refine this product object based on this request: \"{}\". \
         Return only the fields you change, using the same JSON keys. Current state: {}",
        instruction, current
    );

    Ok(json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "responseMimeType": "application/json" }
    }))
}

/// Pull the JSON payload and citations out of a `generateContent` response
///
/// Empty model text yields `{}` so the normalizer can still produce a
/// best-effort entity.
pub fn parse_generate_response(body: &Value) -> Result<RawExtraction, ExtractionError> {
    let candidate = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ExtractionError::Parse("Response has no candidates".to_string()))?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let cleaned = strip_code_fence(&text);
    let payload = if cleaned.is_empty() {
        json!({})
    } else {
        serde_json::from_str(cleaned).map_err(|e| ExtractionError::Parse(e.to_string()))?
    };

    let grounding_sources = candidate
        .pointer("/groundingMetadata/groundingChunks")
        .map(normalize_grounding_sources)
        .unwrap_or_default();

    Ok(RawExtraction {
        payload,
        grounding_sources,
    })
}

/// Remove a surrounding ```json fence if the model added one
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(1000);
        assert_eq!(limiter.min_interval, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(200);
        let start = Instant::now();

        limiter.wait().await;
        limiter.wait().await;

        assert!(start.elapsed() >= Duration::from_millis(190));
    }

    #[test]
    fn test_endpoint_uses_model() {
        let client = GeminiClient::new("key", "gemini-test")
            .unwrap()
            .with_base_url("http://localhost:9999/models/");
        assert_eq!(client.endpoint(), "http://localhost:9999/models/gemini-test:generateContent");
        assert_eq!(client.model(), "gemini-test");
    }

    #[test]
    fn test_extract_request_parts() {
        let body = build_extract_request(&[
            ExtractionInput::image("QUJD", "image/png"),
            ExtractionInput::url("https://shop.example/p/1"),
        ]);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "QUJD");
        assert_eq!(parts[2]["text"], "Source Info (url): https://shop.example/p/1");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_refine_request_omits_images() {
        let mut entity = CatalogueEntity::placeholder(&EntitySource::composite("a.jpg"));
        entity.source_images = Some(vec!["data:image/png;base64,SECRETPIXELS".to_string()]);

        let body = build_refine_request(&entity, "add allergens").unwrap();
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();

        assert!(prompt.contains("add allergens"));
        assert!(!prompt.contains("SECRETPIXELS"));
    }

    #[test]
    fn test_parse_response_with_grounding() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "```json\n{\"isFood\": true}\n```"}]},
                "groundingMetadata": {"groundingChunks": [{"web": {"uri": "https://src.example", "title": "Src"}}]}
            }]
        });

        let raw = parse_generate_response(&body).unwrap();
        assert_eq!(raw.payload["isFood"], true);
        assert_eq!(raw.grounding_sources.len(), 1);
        assert_eq!(raw.grounding_sources[0].uri, "https://src.example");
    }

    #[test]
    fn test_parse_empty_text_is_empty_object() {
        let body = json!({"candidates": [{"content": {"parts": []}}]});
        let raw = parse_generate_response(&body).unwrap();
        assert_eq!(raw.payload, json!({}));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_generate_response(&json!({})),
            Err(ExtractionError::Parse(_))
        ));

        let body = json!({"candidates": [{"content": {"parts": [{"text": "not json"}]}}]});
        assert!(matches!(
            parse_generate_response(&body),
            Err(ExtractionError::Parse(_))
        ));
    }
}
