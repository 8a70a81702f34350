use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackboardScope {
    Task,
    Global,
}

/// `(key, value, lastWriter, at)`. Returned from
/// `getTask`/global reads as an owned copy; the live map is never handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackboardEntry {
    pub scope: BlackboardScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub key: String,
    pub value: Value,
    pub last_writer: String,
    pub at: DateTime<Utc>,
}
