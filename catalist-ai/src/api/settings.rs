//! Settings API endpoint
//!
//! Provides POST /api/settings/gemini_api_key

use crate::extractors::GeminiClient;
use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Request payload for setting the Gemini API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

/// Response payload for API key configuration
#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable status message
    pub message: String,
}

/// POST /api/settings/gemini_api_key handler
///
/// **Request:** `{"api_key": "your-gemini-key"}`
///
/// **Behavior:**
/// 1. Validate key (non-empty, non-whitespace)
/// 2. Write to database (authoritative)
/// 3. Swap the live extractor for a Gemini client using the new key
/// 4. Sync to TOML (best-effort backup)
///
/// **Errors:**
/// - 400 Bad Request: Empty or whitespace-only key
/// - 500 Internal Server Error: Database write failure
pub async fn set_gemini_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    let key = payload.api_key.trim().to_string();

    crate::db::settings::set_gemini_api_key(&state.db, key.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    info!("Gemini API key configured via HTTP");

    let client = GeminiClient::new(key.clone(), state.settings.gemini_model.clone())
        .map_err(|e| ApiError::Internal(format!("Failed to build Gemini client: {}", e)))?;
    state.set_extractor(Arc::new(client)).await;

    if let Some(toml_path) = &state.settings.toml_path {
        let mut settings = HashMap::new();
        settings.insert("gemini_api_key".to_string(), key);

        if let Err(e) = crate::config::sync_settings_to_toml(settings, toml_path).await {
            warn!("TOML sync failed (database write succeeded): {}", e);
        }
    }

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: "Gemini API key configured successfully".to_string(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/gemini_api_key", post(set_gemini_api_key))
}
