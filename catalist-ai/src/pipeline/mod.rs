//! Ingest → review batch pipeline
//!
//! Owns the pending queue, the review cursor and the undo/redo history for
//! one user session. Only `ingest` and a successful refinement create
//! history checkpoints; `discard` and `commit` are terminal and bypass it.
//!
//! Refinement is split in two so callers can release any lock around the
//! pipeline while the model call is in flight:
//!
//! ```text
//! begin_refine(index)  -> RefineTicket   (marks the entity in flight)
//! <collaborator call, no pipeline borrow>
//! complete_refine(ticket, result)        (merges, or drops a late result)
//! ```
//!
//! Results are matched back by entity id. If the entity left `pending`
//! while the call was running (discarded, committed, or undone away) the
//! result is dropped. Dropping a ticket without completing it (a cancelled
//! request) releases the claim, so the entity can be refined again.
//!
//! Committed entities belong to the registry: undo and redo never bring
//! them back into `pending`.

pub mod history;

use crate::extractors::{CatalogueExtractor, ExtractionError};
use crate::models::CatalogueEntity;
use crate::normalizer::normalize_patch;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

pub use history::{SnapshotHistory, MAX_HISTORY_DEPTH};

/// Pipeline operation errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Ingest requires at least one entity")]
    EmptyIngest,

    #[error("Index {index} out of range (pending batch has {len} entities)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Refine instruction is empty")]
    EmptyInstruction,

    #[error("A refinement is already running for entity {0}")]
    RefineInFlight(Uuid),

    #[error("Refinement failed: {0}")]
    Refinement(#[from] ExtractionError),
}

/// Entity ids with a refinement running, shared with outstanding tickets
#[derive(Debug, Default)]
struct InFlight(Arc<Mutex<HashSet<Uuid>>>);

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, entity_id: Uuid) -> bool {
        self.lock().insert(entity_id)
    }

    fn release(&self, entity_id: Uuid) {
        self.lock().remove(&entity_id);
    }

    fn contains(&self, entity_id: Uuid) -> bool {
        self.lock().contains(&entity_id)
    }

    fn handle(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Claim on one in-flight refinement
///
/// The claim is released when the ticket is dropped, whether or not it was
/// passed to `complete_refine`.
#[derive(Debug)]
pub struct RefineTicket {
    entity_id: Uuid,
    instruction: String,
    context: CatalogueEntity,
    claims: InFlight,
    completed: bool,
}

impl Drop for RefineTicket {
    fn drop(&mut self) {
        self.claims.release(self.entity_id);
        if !self.completed {
            tracing::warn!(entity_id = %self.entity_id, "Refinement abandoned before completion; claim released");
        }
    }
}

impl RefineTicket {
    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// The entity as it was when the refinement started
    pub fn context(&self) -> &CatalogueEntity {
        &self.context
    }
}

/// Result of completing a refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Merged into the entity now at `index`
    Applied { index: usize },
    /// Entity no longer pending; result discarded
    Dropped,
}

/// Pending batch with cursor and snapshot history
#[derive(Debug)]
pub struct BatchPipeline {
    pending: Vec<CatalogueEntity>,
    cursor: usize,
    history: SnapshotHistory<Vec<CatalogueEntity>>,
    in_flight: InFlight,
    committed: HashSet<Uuid>,
    last_refinement: Option<String>,
}

impl Default for BatchPipeline {
    fn default() -> Self {
        Self::new(MAX_HISTORY_DEPTH)
    }
}

impl BatchPipeline {
    pub fn new(history_depth: usize) -> Self {
        Self {
            pending: Vec::new(),
            cursor: 0,
            history: SnapshotHistory::new(history_depth),
            in_flight: InFlight::default(),
            committed: HashSet::new(),
            last_refinement: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn pending(&self) -> &[CatalogueEntity] {
        &self.pending
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Entity under review, if any
    pub fn current(&self) -> Option<&CatalogueEntity> {
        self.pending.get(self.cursor)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_pointer(&self) -> Option<usize> {
        self.history.pointer()
    }

    /// Instruction of the last refinement merged since the previous commit
    pub fn last_refinement(&self) -> Option<&str> {
        self.last_refinement.as_deref()
    }

    pub fn is_refining(&self, entity_id: Uuid) -> bool {
        self.in_flight.contains(entity_id)
    }

    /// True once the entity has been committed out of this batch
    pub fn is_committed(&self, entity_id: Uuid) -> bool {
        self.committed.contains(&entity_id)
    }

    /// Move the review cursor
    pub fn set_cursor(&mut self, index: usize) -> Result<(), PipelineError> {
        self.check_index(index)?;
        self.cursor = index;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Append entities, checkpoint, and point the cursor at the last one
    pub fn ingest(&mut self, entities: Vec<CatalogueEntity>) -> Result<usize, PipelineError> {
        if entities.is_empty() {
            return Err(PipelineError::EmptyIngest);
        }

        let added = entities.len();
        self.pending.extend(entities);
        self.history.push(self.pending.clone());
        self.cursor = self.pending.len() - 1;

        tracing::info!(
            added,
            pending = self.pending.len(),
            cursor = self.cursor,
            "Entities ingested into pending batch"
        );

        Ok(self.cursor)
    }

    /// Claim the entity at `index` for refinement
    pub fn begin_refine(
        &mut self,
        index: usize,
        instruction: &str,
    ) -> Result<RefineTicket, PipelineError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(PipelineError::EmptyInstruction);
        }

        self.check_index(index)?;
        let entity = &self.pending[index];

        if !self.in_flight.claim(entity.id) {
            return Err(PipelineError::RefineInFlight(entity.id));
        }

        Ok(RefineTicket {
            entity_id: entity.id,
            instruction: instruction.to_string(),
            context: entity.clone(),
            claims: self.in_flight.handle(),
            completed: false,
        })
    }

    /// Finish a refinement started with `begin_refine`
    ///
    /// On error the batch is left untouched and no checkpoint is pushed.
    pub fn complete_refine(
        &mut self,
        mut ticket: RefineTicket,
        result: Result<Value, ExtractionError>,
    ) -> Result<RefineOutcome, PipelineError> {
        ticket.completed = true;
        self.in_flight.release(ticket.entity_id);

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(entity_id = %ticket.entity_id, error = %e, "Refinement failed; entity unchanged");
                return Err(PipelineError::Refinement(e));
            }
        };

        let Some(index) = self.index_of(ticket.entity_id) else {
            tracing::warn!(
                entity_id = %ticket.entity_id,
                "Refinement finished after entity left the pending batch; result dropped"
            );
            return Ok(RefineOutcome::Dropped);
        };

        let patch = normalize_patch(&raw);
        if patch.is_empty() {
            tracing::debug!(entity_id = %ticket.entity_id, "Refinement returned no recognised fields");
        }

        self.pending[index].apply_patch(patch);
        self.history.push(self.pending.clone());
        self.last_refinement = Some(std::mem::take(&mut ticket.instruction));

        tracing::info!(entity_id = %ticket.entity_id, index, "Refinement applied");

        Ok(RefineOutcome::Applied { index })
    }

    /// Refine in one step, holding `&mut self` across the model call
    pub async fn refine<E>(
        &mut self,
        extractor: &E,
        index: usize,
        instruction: &str,
    ) -> Result<RefineOutcome, PipelineError>
    where
        E: CatalogueExtractor + ?Sized,
    {
        let ticket = self.begin_refine(index, instruction)?;
        let result = extractor.refine(ticket.context(), ticket.instruction()).await;
        self.complete_refine(ticket, result)
    }

    /// Drop the entity at `index` without committing it
    pub fn discard(&mut self, index: usize) -> Result<CatalogueEntity, PipelineError> {
        self.check_index(index)?;
        let entity = self.pending.remove(index);
        self.clamp_cursor();

        tracing::info!(entity_id = %entity.id, pending = self.pending.len(), "Entity discarded");
        Ok(entity)
    }

    /// Remove the entity at `index` and stamp it for the registry
    pub fn commit(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<CatalogueEntity, PipelineError> {
        self.check_index(index)?;
        let mut entity = self.pending.remove(index);
        entity.created_at = Some(now);
        self.committed.insert(entity.id);
        self.clamp_cursor();
        self.last_refinement = None;

        tracing::info!(entity_id = %entity.id, pending = self.pending.len(), "Entity committed");
        Ok(entity)
    }

    /// Restore the previous snapshot; false if already at the oldest
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Restore the next snapshot; false if already at the newest
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Cursor is kept where it was, clamped into the restored batch
    fn restore(&mut self, mut snapshot: Vec<CatalogueEntity>) {
        let before = snapshot.len();
        snapshot.retain(|e| !self.committed.contains(&e.id));

        self.pending = snapshot;
        self.clamp_cursor();
        tracing::debug!(
            pointer = ?self.history.pointer(),
            pending = self.pending.len(),
            skipped_committed = before - self.pending.len(),
            "History snapshot restored"
        );
    }

    fn clamp_cursor(&mut self) {
        self.cursor = if self.pending.is_empty() {
            0
        } else {
            self.cursor.min(self.pending.len() - 1)
        };
    }

    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index < self.pending.len() {
            Ok(())
        } else {
            Err(PipelineError::IndexOutOfRange {
                index,
                len: self.pending.len(),
            })
        }
    }

    fn index_of(&self, entity_id: Uuid) -> Option<usize> {
        self.pending.iter().position(|e| e.id == entity_id)
    }
}
