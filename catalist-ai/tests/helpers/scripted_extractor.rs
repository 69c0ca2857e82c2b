//! Deterministic extraction collaborator for tests

use async_trait::async_trait;
use catalist_ai::extractors::{CatalogueExtractor, ExtractionError, ExtractionInput, RawExtraction};
use catalist_ai::models::{CatalogueEntity, GroundingSource};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Raw model output for a product named `name`
pub fn sample_payload(name: &str) -> Value {
    json!({
        "coreInfo": {"displayName": name, "brand": "Acme", "quantity": "500g", "color": "N/A"},
        "taxonomy": {"segment": "Grocery", "productType": "Snack", "category": "Biscuits", "subCategory": "Oat"},
        "seoInfo": {"keywords": ["oat", "biscuit"], "tags": ["vegan"], "productNotion": "Everyday snack", "occasionRelevance": "Breakfast"},
        "attributes": [
            {"name": "Energy", "value": "450kcal", "confidence": 0.92, "group": "nutrition facts"},
            {"name": "Width", "value": "12cm", "confidence": 88, "group": "Dimensions"}
        ],
        "isFood": true,
        "insights": "Strong shelf presence",
        "dataDensity": 0.64,
        "qualityScore": 81
    })
}

/// Extractor with scripted outcomes
///
/// `extract` succeeds with `sample_payload(label)` unless the label was
/// registered with `fail_label`. `refine` pops queued results, defaulting
/// to an empty patch. The first `stall_refines(n)` refine calls hang for an
/// hour before answering.
#[derive(Default)]
pub struct ScriptedExtractor {
    failing_labels: Mutex<HashMap<String, String>>,
    refine_results: Mutex<VecDeque<Result<Value, String>>>,
    extract_calls: Mutex<Vec<String>>,
    refine_calls: Mutex<Vec<String>>,
    grounding: Mutex<Vec<GroundingSource>>,
    stalled_refines: Mutex<usize>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_label(self, label: &str, message: &str) -> Self {
        self.failing_labels
            .lock()
            .unwrap()
            .insert(label.to_string(), message.to_string());
        self
    }

    pub fn with_grounding(self, uri: &str) -> Self {
        self.grounding.lock().unwrap().push(GroundingSource {
            uri: uri.to_string(),
            title: None,
        });
        self
    }

    pub fn stall_refines(self, count: usize) -> Self {
        *self.stalled_refines.lock().unwrap() = count;
        self
    }

    pub fn queue_refine(&self, result: Result<Value, String>) {
        self.refine_results.lock().unwrap().push_back(result);
    }

    /// Labels passed to `extract`, in call order
    pub fn extract_calls(&self) -> Vec<String> {
        self.extract_calls.lock().unwrap().clone()
    }

    /// Instructions passed to `refine`, in call order
    pub fn refine_calls(&self) -> Vec<String> {
        self.refine_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogueExtractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract(
        &self,
        _inputs: &[ExtractionInput],
        source_label: &str,
    ) -> Result<RawExtraction, ExtractionError> {
        self.extract_calls
            .lock()
            .unwrap()
            .push(source_label.to_string());

        if let Some(message) = self.failing_labels.lock().unwrap().get(source_label) {
            return Err(ExtractionError::Api {
                status: 503,
                message: message.clone(),
            });
        }

        Ok(RawExtraction {
            payload: sample_payload(source_label),
            grounding_sources: self.grounding.lock().unwrap().clone(),
        })
    }

    async fn refine(
        &self,
        _entity: &CatalogueEntity,
        instruction: &str,
    ) -> Result<Value, ExtractionError> {
        self.refine_calls
            .lock()
            .unwrap()
            .push(instruction.to_string());

        let stall = {
            let mut remaining = self.stalled_refines.lock().unwrap();
            let stall = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
            stall
        };
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        match self.refine_results.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(ExtractionError::Network(message)),
            None => Ok(json!({})),
        }
    }
}
