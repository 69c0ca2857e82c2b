//! Event types for the Catalist event system
//!
//! Provides the shared event enum and the EventBus used to fan events out
//! to SSE clients and any in-process listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Direction of a history move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDirection {
    Undo,
    Redo,
}

/// Catalist event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every variant names the user whose batch or registry changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalistEvent {
    /// New entities were appended to a pending batch
    BatchIngested {
        user: String,
        /// Ids of the appended entities, in arrival order
        entity_ids: Vec<Uuid>,
        /// Number of inputs whose extraction failed
        failed_items: usize,
        timestamp: DateTime<Utc>,
    },

    /// One extraction call failed during ingest
    ExtractionFailed {
        user: String,
        /// Source label of the failed item ("Row 2", a file name, a URL)
        label: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A refinement was merged into a pending entity
    EntityRefined {
        user: String,
        entity_id: Uuid,
        instruction: String,
        timestamp: DateTime<Utc>,
    },

    /// A refinement call failed; the entity is unchanged
    RefinementFailed {
        user: String,
        entity_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A pending entity was dropped without committing
    EntityDiscarded {
        user: String,
        entity_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A pending entity moved into the registry
    EntityCommitted {
        user: String,
        entity_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A committed entity was deleted from the registry
    RegistryEntityRemoved {
        user: String,
        entity_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Undo or redo restored a batch snapshot
    HistoryMoved {
        user: String,
        direction: HistoryDirection,
        /// History pointer after the move
        pointer: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CatalistEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            CatalistEvent::BatchIngested { .. } => "BatchIngested",
            CatalistEvent::ExtractionFailed { .. } => "ExtractionFailed",
            CatalistEvent::EntityRefined { .. } => "EntityRefined",
            CatalistEvent::RefinementFailed { .. } => "RefinementFailed",
            CatalistEvent::EntityDiscarded { .. } => "EntityDiscarded",
            CatalistEvent::EntityCommitted { .. } => "EntityCommitted",
            CatalistEvent::RegistryEntityRemoved { .. } => "RegistryEntityRemoved",
            CatalistEvent::HistoryMoved { .. } => "HistoryMoved",
        }
    }

    /// User the event belongs to
    pub fn user(&self) -> &str {
        match self {
            CatalistEvent::BatchIngested { user, .. }
            | CatalistEvent::ExtractionFailed { user, .. }
            | CatalistEvent::EntityRefined { user, .. }
            | CatalistEvent::RefinementFailed { user, .. }
            | CatalistEvent::EntityDiscarded { user, .. }
            | CatalistEvent::EntityCommitted { user, .. }
            | CatalistEvent::RegistryEntityRemoved { user, .. }
            | CatalistEvent::HistoryMoved { user, .. } => user,
        }
    }
}

/// Broadcast bus for CatalistEvent
///
/// Cloning shares the underlying channel. Events emitted before a
/// subscriber exists are not replayed.
///
/// # Examples
///
/// ```
/// use catalist_common::events::{CatalistEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(CatalistEvent::EntityDiscarded {
///     user: "ana@example.com".to_string(),
///     entity_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalistEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalistEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalistEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalistEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalistEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
