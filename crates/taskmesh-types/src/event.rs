use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ sequence, type, taskId, at, payload }` — the canonical wire envelope
/// `sequence` is assigned by the Event Bus at publish time and is
/// the only field consumers may order by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub at: DateTime<Utc>,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(sequence: u64, event_type: impl Into<String>, task_id: Option<String>, payload: Value) -> Self {
        Self {
            sequence,
            event_type: event_type.into(),
            task_id,
            at: Utc::now(),
            payload,
        }
    }
}

/// A type alias documenting that an envelope's `payload` is an intentionally
/// opaque blob as far as the core is concerned — UI payload shapes are out
/// of scope for this crate.
pub type EventPayload = Value;

pub const ACTION_RECEIVED: &str = "action.received";
pub const TASK_DONE: &str = "task.done";
pub const TASK_FAILED: &str = "task.failed";
pub const UI_SURFACE: &str = "ui.surface";
pub const UI_PATCH: &str = "ui.patch";

/// The canonical event-type list, collected so producers cannot
/// typo an event type that ought to exist and consumers have one place to
/// check "is this one of ours".
pub mod event_types {
    pub const TASK_SUBMITTED: &str = "task.submitted";
    pub const TASK_TRANSITION: &str = "task.transition";
    pub const TASK_DECISION: &str = "task.decision";
    pub const TASK_RETRY: &str = "task.retry";
    pub const TASK_DONE: &str = "task.done";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_ESCALATED: &str = "task.escalated";
    pub const TASK_INTERVENTION: &str = "task.intervention";
    pub const TASK_SNAPSHOT: &str = "task.snapshot";
    pub const ROLE_DISPATCHED: &str = "role.dispatched";
    pub const ROLE_STARTED: &str = "role.started";
    pub const ROLE_SUCCEEDED: &str = "role.succeeded";
    pub const ROLE_FAILED: &str = "role.failed";
    pub const UI_SURFACE: &str = "ui.surface";
    pub const UI_PATCH: &str = "ui.patch";
    pub const ACTION_RECEIVED: &str = "action.received";
    pub const ACTION_ACKNOWLEDGED: &str = "action.acknowledged";
    pub const ACTION_REJECTED: &str = "action.rejected";
    pub const MEMORY_BOOTSTRAP: &str = "memory.bootstrap";
    pub const MEMORY_TASKS: &str = "memory.tasks";
    pub const TELEMETRY_QUALITY: &str = "telemetry.quality";
    pub const TELEMETRY_RETRY: &str = "telemetry.retry";
    pub const TELEMETRY_CIRCUIT: &str = "telemetry.circuit";
    pub const TELEMETRY_CONSENSUS: &str = "telemetry.consensus";

    pub const ALL: &[&str] = &[
        TASK_SUBMITTED,
        TASK_TRANSITION,
        TASK_DECISION,
        TASK_RETRY,
        TASK_DONE,
        TASK_FAILED,
        TASK_ESCALATED,
        TASK_INTERVENTION,
        TASK_SNAPSHOT,
        ROLE_DISPATCHED,
        ROLE_STARTED,
        ROLE_SUCCEEDED,
        ROLE_FAILED,
        UI_SURFACE,
        UI_PATCH,
        ACTION_RECEIVED,
        ACTION_ACKNOWLEDGED,
        ACTION_REJECTED,
        MEMORY_BOOTSTRAP,
        MEMORY_TASKS,
        TELEMETRY_QUALITY,
        TELEMETRY_RETRY,
        TELEMETRY_CIRCUIT,
        TELEMETRY_CONSENSUS,
    ];
}
