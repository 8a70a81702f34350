use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("adapter '{0}' not found in configuration")]
    AdapterNotFound(String),

    #[error("adapter '{adapter_id}' circuit is open until {expires_at}")]
    CircuitOpen {
        adapter_id: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("all adapters in fallback order exhausted for role '{role}'")]
    AdaptersExhausted { role: String },

    #[error("adapter '{adapter_id}' timed out after {timeout_seconds}s")]
    AdapterTimeout {
        adapter_id: String,
        timeout_seconds: u64,
    },

    #[error("adapter '{adapter_id}' exited with status {status}")]
    AdapterNonZeroExit { adapter_id: String, status: i32 },

    #[error("failed to spawn adapter '{adapter_id}': {source}")]
    AdapterSpawn {
        adapter_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("blackboard key '{0}' not found")]
    BlackboardKeyNotFound(String),

    #[error("no GOAP plan satisfies the requested goal")]
    PlanUnreachable,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    /// The adapter this failure is attributable to, when one exists. Used by
    /// the Supervisor to count per-adapter failures toward a circuit without
    /// the Adapter Executor itself deciding when a circuit should open.
    pub fn adapter_id(&self) -> Option<&str> {
        match self {
            CoreError::AdapterNotFound(id) => Some(id),
            CoreError::CircuitOpen { adapter_id, .. }
            | CoreError::AdapterTimeout { adapter_id, .. }
            | CoreError::AdapterNonZeroExit { adapter_id, .. }
            | CoreError::AdapterSpawn { adapter_id, .. } => Some(adapter_id),
            CoreError::AdaptersExhausted { .. }
            | CoreError::BlackboardKeyNotFound(_)
            | CoreError::PlanUnreachable
            | CoreError::Serde(_) => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
