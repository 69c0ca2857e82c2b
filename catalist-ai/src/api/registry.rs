//! Registry endpoints: listing, removal, summary, section text and CSV export

use crate::export::{entity_to_csv, registry_to_csv, section_text};
use crate::models::{AttributeGroup, CatalogueEntity};
use crate::registry::RegistrySummary;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use catalist_common::events::CatalistEvent;
use chrono::Utc;
use uuid::Uuid;

/// GET /api/users/:user/registry
pub async fn list_registry(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<Vec<CatalogueEntity>>> {
    let registry = state.registry.load(&user).await?;
    Ok(Json(registry.into_items()))
}

/// DELETE /api/users/:user/registry/:id
pub async fn remove_entity(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let _guard = state.registry_guard.lock().await;

    let mut registry = state.registry.load(&user).await?;
    if registry.remove(id).is_none() {
        return Err(ApiError::NotFound(format!("Registry entity {}", id)));
    }
    state.registry.save(&registry).await?;

    tracing::info!(user = %user, entity_id = %id, "Registry entity removed");
    state.event_bus.emit_lossy(CatalistEvent::RegistryEntityRemoved {
        user,
        entity_id: id,
        timestamp: Utc::now(),
    });

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users/:user/registry/summary
pub async fn registry_summary(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<RegistrySummary>> {
    let registry = state.registry.load(&user).await?;
    Ok(Json(registry.summary()))
}

/// GET /api/users/:user/registry/export.csv
pub async fn export_registry(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Response> {
    let registry = state.registry.load(&user).await?;
    let body = registry_to_csv(registry.items())?;
    Ok(csv_attachment(body, "catalist-registry-export.csv"))
}

/// GET /api/users/:user/registry/:id/export.csv
pub async fn export_entity(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, Uuid)>,
) -> ApiResult<Response> {
    let registry = state.registry.load(&user).await?;
    let entity = registry
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("Registry entity {}", id)))?;

    let body = entity_to_csv(entity)?;
    Ok(csv_attachment(body, &format!("catalist-product-{}.csv", id)))
}

/// GET /api/users/:user/registry/:id/sections/:group
pub async fn entity_section(
    State(state): State<AppState>,
    Path((user, id, group)): Path<(String, Uuid, String)>,
) -> ApiResult<String> {
    let group = AttributeGroup::from_canonical(&group)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown attribute group: {}", group)))?;

    let registry = state.registry.load(&user).await?;
    let entity = registry
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("Registry entity {}", id)))?;

    Ok(section_text(entity, group))
}

fn csv_attachment(body: String, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

/// Build registry routes
pub fn registry_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/:user/registry", get(list_registry))
        .route("/api/users/:user/registry/summary", get(registry_summary))
        .route("/api/users/:user/registry/export.csv", get(export_registry))
        .route("/api/users/:user/registry/:id", delete(remove_entity))
        .route("/api/users/:user/registry/:id/export.csv", get(export_entity))
        .route("/api/users/:user/registry/:id/sections/:group", get(entity_section))
}
