//! Pending batch endpoints
//!
//! Ingest, cursor, refine, discard, commit, undo and redo for one user's
//! pending batch. The pipeline lock is never held across a model call:
//! refinement takes a ticket, releases the lock, calls the extractor, then
//! locks again to merge (or drop) the result.

use crate::export::section_text;
use crate::ingest::{run_ingest, IngestFailure, IngestRequest};
use crate::models::{AttributeGroup, CatalogueEntity};
use crate::pipeline::{BatchPipeline, RefineOutcome};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use catalist_common::events::{CatalistEvent, HistoryDirection};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Snapshot of a pending batch as returned to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub pending: Vec<CatalogueEntity>,
    pub cursor: usize,
    pub idle: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub history_len: usize,
    pub history_pointer: Option<usize>,
    pub last_refinement: Option<String>,
}

impl From<&BatchPipeline> for BatchView {
    fn from(pipeline: &BatchPipeline) -> Self {
        Self {
            pending: pipeline.pending().to_vec(),
            cursor: pipeline.cursor(),
            idle: pipeline.is_idle(),
            can_undo: pipeline.can_undo(),
            can_redo: pipeline.can_redo(),
            history_len: pipeline.history_len(),
            history_pointer: pipeline.history_pointer(),
            last_refinement: pipeline.last_refinement().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub ingested: usize,
    pub failures: Vec<IngestFailure>,
    pub batch: BatchView,
}

#[derive(Debug, Deserialize)]
pub struct CursorRequest {
    pub index: usize,
}

/// Target entity; defaults to the cursor
#[derive(Debug, Default, Deserialize)]
pub struct IndexRequest {
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    #[serde(default)]
    pub index: Option<usize>,
    pub instruction: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineResponse {
    /// False when the entity left the batch before the result arrived
    pub applied: bool,
    pub batch: BatchView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse {
    pub entity: CatalogueEntity,
    pub batch: BatchView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub moved: bool,
    pub batch: BatchView,
}

/// GET /api/users/:user/batch
pub async fn get_batch(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<BatchView> {
    let pipeline = state.pipeline_for(&user).await;
    let pipeline = pipeline.lock().await;
    Json(BatchView::from(&*pipeline))
}

/// POST /api/users/:user/ingest
///
/// Extraction failures are reported per item; the request fails only when
/// every item failed.
pub async fn ingest(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let extractor = state.current_extractor().await;
    let report = run_ingest(extractor.as_ref(), &request, state.settings.max_csv_rows).await?;

    for failure in &report.failures {
        state.event_bus.emit_lossy(CatalistEvent::ExtractionFailed {
            user: user.clone(),
            label: failure.label.clone(),
            message: failure.message.clone(),
            timestamp: Utc::now(),
        });
    }

    if report.entities.is_empty() {
        let detail = report
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.label, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        state.record_error(detail.clone()).await;
        return Err(ApiError::BadGateway(detail));
    }

    let entity_ids = report.entities.iter().map(|e| e.id).collect::<Vec<_>>();
    let ingested = report.entities.len();

    let pipeline = state.pipeline_for(&user).await;
    let mut pipeline = pipeline.lock().await;
    pipeline.ingest(report.entities)?;

    tracing::info!(user = %user, ingested, failed = report.failures.len(), "Batch ingested");

    state.event_bus.emit_lossy(CatalistEvent::BatchIngested {
        user: user.clone(),
        entity_ids,
        failed_items: report.failures.len(),
        timestamp: Utc::now(),
    });

    Ok(Json(IngestResponse {
        ingested,
        failures: report.failures,
        batch: BatchView::from(&*pipeline),
    }))
}

/// POST /api/users/:user/batch/cursor
pub async fn set_cursor(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(request): Json<CursorRequest>,
) -> ApiResult<Json<BatchView>> {
    let pipeline = state.pipeline_for(&user).await;
    let mut pipeline = pipeline.lock().await;
    pipeline.set_cursor(request.index)?;
    Ok(Json(BatchView::from(&*pipeline)))
}

/// POST /api/users/:user/batch/refine
pub async fn refine(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(request): Json<RefineRequest>,
) -> ApiResult<Json<RefineResponse>> {
    let pipeline = state.pipeline_for(&user).await;

    let ticket = {
        let mut guard = pipeline.lock().await;
        let index = request.index.unwrap_or(guard.cursor());
        guard.begin_refine(index, &request.instruction)?
    };

    let entity_id = ticket.entity_id();
    let extractor = state.current_extractor().await;
    let result = extractor.refine(ticket.context(), ticket.instruction()).await;
    let instruction = ticket.instruction().to_string();

    let mut guard = pipeline.lock().await;
    let outcome = match guard.complete_refine(ticket, result) {
        Ok(outcome) => outcome,
        Err(e) => {
            state.record_error(e.to_string()).await;
            state.event_bus.emit_lossy(CatalistEvent::RefinementFailed {
                user: user.clone(),
                entity_id,
                message: e.to_string(),
                timestamp: Utc::now(),
            });
            return Err(e.into());
        }
    };

    let applied = matches!(outcome, RefineOutcome::Applied { .. });
    if applied {
        state.event_bus.emit_lossy(CatalistEvent::EntityRefined {
            user: user.clone(),
            entity_id,
            instruction,
            timestamp: Utc::now(),
        });
    }

    Ok(Json(RefineResponse {
        applied,
        batch: BatchView::from(&*guard),
    }))
}

/// POST /api/users/:user/batch/discard
pub async fn discard(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(request): Json<IndexRequest>,
) -> ApiResult<Json<EntityResponse>> {
    let pipeline = state.pipeline_for(&user).await;
    let mut pipeline = pipeline.lock().await;
    let index = request.index.unwrap_or(pipeline.cursor());
    let entity = pipeline.discard(index)?;

    state.event_bus.emit_lossy(CatalistEvent::EntityDiscarded {
        user: user.clone(),
        entity_id: entity.id,
        timestamp: Utc::now(),
    });

    Ok(Json(EntityResponse {
        entity,
        batch: BatchView::from(&*pipeline),
    }))
}

/// POST /api/users/:user/batch/commit
///
/// The registry is saved before the entity leaves the pending batch, so a
/// failed save leaves the batch untouched.
pub async fn commit(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(request): Json<IndexRequest>,
) -> ApiResult<Json<EntityResponse>> {
    let pipeline = state.pipeline_for(&user).await;
    let mut pipeline = pipeline.lock().await;
    let index = request.index.unwrap_or(pipeline.cursor());
    let now = Utc::now();

    let mut staged = pipeline
        .pending()
        .get(index)
        .cloned()
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Index {} out of range (pending batch has {} entities)",
                index,
                pipeline.pending().len()
            ))
        })?;
    staged.created_at = Some(now);

    {
        let _guard = state.registry_guard.lock().await;
        let mut registry = state.registry.load_at(&user, now).await?;
        registry.prepend(staged);
        state.registry.save(&registry).await?;
    }

    let entity = pipeline.commit(index, now)?;

    tracing::info!(user = %user, entity_id = %entity.id, "Entity committed to registry");
    state.event_bus.emit_lossy(CatalistEvent::EntityCommitted {
        user: user.clone(),
        entity_id: entity.id,
        timestamp: now,
    });

    Ok(Json(EntityResponse {
        entity,
        batch: BatchView::from(&*pipeline),
    }))
}

/// POST /api/users/:user/batch/undo
pub async fn undo(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<HistoryResponse> {
    move_history(&state, user, HistoryDirection::Undo).await
}

/// POST /api/users/:user/batch/redo
pub async fn redo(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<HistoryResponse> {
    move_history(&state, user, HistoryDirection::Redo).await
}

async fn move_history(
    state: &AppState,
    user: String,
    direction: HistoryDirection,
) -> Json<HistoryResponse> {
    let pipeline = state.pipeline_for(&user).await;
    let mut pipeline = pipeline.lock().await;

    let moved = match direction {
        HistoryDirection::Undo => pipeline.undo(),
        HistoryDirection::Redo => pipeline.redo(),
    };

    if let (true, Some(pointer)) = (moved, pipeline.history_pointer()) {
        state.event_bus.emit_lossy(CatalistEvent::HistoryMoved {
            user,
            direction,
            pointer,
            timestamp: Utc::now(),
        });
    }

    Json(HistoryResponse {
        moved,
        batch: BatchView::from(&*pipeline),
    })
}

/// GET /api/users/:user/batch/sections/:group
///
/// Plain-text `name: value` lines for one attribute group of the entity
/// under the cursor.
pub async fn current_section(
    State(state): State<AppState>,
    Path((user, group)): Path<(String, String)>,
) -> ApiResult<String> {
    let group = AttributeGroup::from_canonical(&group)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown attribute group: {}", group)))?;

    let pipeline = state.pipeline_for(&user).await;
    let pipeline = pipeline.lock().await;
    let entity = pipeline
        .current()
        .ok_or_else(|| ApiError::NotFound("Pending batch is empty".to_string()))?;

    Ok(section_text(entity, group))
}

/// Build pending batch routes
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/:user/ingest", post(ingest))
        .route("/api/users/:user/batch", get(get_batch))
        .route("/api/users/:user/batch/cursor", post(set_cursor))
        .route("/api/users/:user/batch/refine", post(refine))
        .route("/api/users/:user/batch/discard", post(discard))
        .route("/api/users/:user/batch/commit", post(commit))
        .route("/api/users/:user/batch/undo", post(undo))
        .route("/api/users/:user/batch/redo", post(redo))
        .route("/api/users/:user/batch/sections/:group", get(current_section))
}
