use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-adapter circuit breaker state. The only legal transitions are
/// `Closed -> Open -> HalfOpen -> Closed | Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitInfo {
    pub adapter_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CircuitInfo {
    pub fn closed(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            expires_at: None,
        }
    }
}
