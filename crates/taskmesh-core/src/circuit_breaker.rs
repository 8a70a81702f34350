use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::Level;

use taskmesh_observability::{emit_event, ObservabilityEvent, ProcessKind};
use taskmesh_types::circuit::{CircuitInfo, CircuitState};

/// Tracks one `CircuitInfo` per adapter id. The only legal transitions are
/// `Closed -> Open -> HalfOpen -> Closed | Open`; every
/// mutator here enforces that lattice rather than setting state directly.
#[derive(Clone)]
pub struct CircuitBreakers {
    threshold: u32,
    open_duration: chrono::Duration,
    circuits: Arc<RwLock<HashMap<String, CircuitInfo>>>,
}

impl CircuitBreakers {
    pub fn new(threshold: u32, open_duration_seconds: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            open_duration: chrono::Duration::seconds(open_duration_seconds as i64),
            circuits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Reads the circuit's usable state, auto-transitioning `Open ->
    /// HalfOpen` when the cooldown window has elapsed ("Circuit
    /// Breaker" half-open probing).
    pub async fn usable_state(&self, adapter_id: &str) -> CircuitState {
        let mut circuits = self.circuits.write().await;
        let entry = circuits
            .entry(adapter_id.to_string())
            .or_insert_with(|| CircuitInfo::closed(adapter_id));

        if entry.state == CircuitState::Open {
            if let Some(expires_at) = entry.expires_at {
                if Utc::now() >= expires_at {
                    entry.state = CircuitState::HalfOpen;
                    emit_circuit_transition(adapter_id, CircuitState::HalfOpen);
                }
            }
        }

        entry.state
    }

    /// Returns `true` if this success transitioned the circuit out of
    /// `Open`/`HalfOpen` into `Closed` — the caller's cue to publish the
    /// recovery rather than stay quiet about an already-closed circuit.
    pub async fn record_success(&self, adapter_id: &str) -> bool {
        let mut circuits = self.circuits.write().await;
        let entry = circuits
            .entry(adapter_id.to_string())
            .or_insert_with(|| CircuitInfo::closed(adapter_id));
        let was_closed = entry.state == CircuitState::Closed;
        entry.state = CircuitState::Closed;
        entry.consecutive_failures = 0;
        entry.opened_at = None;
        entry.expires_at = None;
        if !was_closed {
            emit_circuit_transition(adapter_id, CircuitState::Closed);
        }
        !was_closed
    }

    /// Returns the new `expiresAt` if this failure just opened the circuit,
    /// so the caller can publish `AdapterCircuitOpen` and write the
    /// blackboard signal exactly once per open transition.
    pub async fn record_failure(&self, adapter_id: &str) -> Option<DateTime<Utc>> {
        let mut circuits = self.circuits.write().await;
        let entry = circuits
            .entry(adapter_id.to_string())
            .or_insert_with(|| CircuitInfo::closed(adapter_id));

        entry.consecutive_failures += 1;

        let should_open = match entry.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => entry.consecutive_failures >= self.threshold,
            CircuitState::Open => false,
        };

        if should_open {
            let now = Utc::now();
            entry.state = CircuitState::Open;
            entry.opened_at = Some(now);
            entry.expires_at = Some(now + self.open_duration);
            emit_circuit_transition(adapter_id, CircuitState::Open);
        }

        if should_open {
            entry.expires_at
        } else {
            None
        }
    }

    pub async fn info(&self, adapter_id: &str) -> CircuitInfo {
        let mut circuits = self.circuits.write().await;
        circuits
            .entry(adapter_id.to_string())
            .or_insert_with(|| CircuitInfo::closed(adapter_id))
            .clone()
    }

    pub async fn expires_at(&self, adapter_id: &str) -> Option<DateTime<Utc>> {
        self.circuits
            .read()
            .await
            .get(adapter_id)
            .and_then(|c| c.expires_at)
    }

    pub async fn snapshot(&self) -> Vec<CircuitInfo> {
        self.circuits.read().await.values().cloned().collect()
    }
}

fn emit_circuit_transition(adapter_id: &str, new_state: CircuitState) {
    let status = match new_state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    };
    emit_event(
        Level::INFO,
        ProcessKind::Supervisor,
        ObservabilityEvent {
            event: "circuit.transition",
            component: "circuit_breaker",
            correlation_id: None,
            task_id: None,
            role: None,
            adapter_id: Some(adapter_id),
            status: Some(status),
            error_code: None,
            detail: None,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreakers::new(3, 300);
        cb.record_failure("a").await;
        cb.record_failure("a").await;
        assert_eq!(cb.usable_state("a").await, CircuitState::Closed);
        cb.record_failure("a").await;
        assert_eq!(cb.usable_state("a").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_to_closed() {
        let cb = CircuitBreakers::new(1, 300);
        cb.record_failure("a").await;
        assert_eq!(cb.usable_state("a").await, CircuitState::Open);
        cb.record_success("a").await;
        assert_eq!(cb.usable_state("a").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_rather_than_staying_half_open() {
        let cb = CircuitBreakers::new(1, 0);
        cb.record_failure("a").await;
        // open_duration of 0 means the very next read flips to half-open.
        assert_eq!(cb.usable_state("a").await, CircuitState::HalfOpen);
        cb.record_failure("a").await;
        assert_eq!(cb.usable_state("a").await, CircuitState::Open);
    }
}
