use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Planning,
    Building,
    Reviewing,
    Done,
    Blocked,
}

/// `{ id, title, description, status, ... }`.
///
/// Owned exclusively by its Coordinator for the duration of the task's
/// lifecycle; the registry only ever holds copies (`TaskSnapshot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub planning_output: Option<String>,
    #[serde(default)]
    pub build_output: Option<String>,
    #[serde(default)]
    pub review_output: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub sub_task_ids: BTreeSet<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Queued,
            created_at: now,
            updated_at: now,
            planning_output: None,
            build_output: None,
            review_output: None,
            summary: None,
            error: None,
            parent_task_id: None,
            sub_task_ids: BTreeSet::new(),
        }
    }

    pub fn to_snapshot(&self, retry_count: u32, depth: u32, paused: bool) -> TaskSnapshot {
        TaskSnapshot {
            task: self.clone(),
            retry_count,
            depth,
            paused,
            pending_children: self.sub_task_ids.clone(),
        }
    }
}

/// The serializable projection written to `MemoryWriter` on every transition
/// and used as the `task.snapshot` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: Task,
    pub retry_count: u32,
    pub depth: u32,
    pub paused: bool,
    pub pending_children: BTreeSet<String>,
}
