use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Builder,
    Reviewer,
    Orchestrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Builder => "builder",
            Role::Reviewer => "reviewer",
            Role::Orchestrator => "orchestrator",
        }
    }
}

/// In-process-only tagged union exchanged between the Coordinator and the
/// worker pool / supervisor. Never serialized onto the
/// wire — the Event Bus only ever sees the envelope-wrapped projection of
/// these.
#[derive(Debug, Clone)]
pub enum RoleMessage {
    ExecuteRole {
        task_id: String,
        role: Role,
        title: String,
        description: String,
        plan_output: Option<String>,
        build_output: Option<String>,
        prompt: Option<String>,
        preferred_adapter: Option<String>,
        prior_confidence: Option<f64>,
    },
    RoleSucceeded {
        task_id: String,
        role: Role,
        output: String,
        confidence: f64,
        adapter_id: String,
        completed_at: DateTime<Utc>,
    },
    RoleFailed {
        task_id: String,
        role: Role,
        error: String,
        retriable: bool,
        /// The last adapter attempted before the fallback chain gave up, if
        /// any was attempted at all (an empty adapter list fails with none).
        /// Lets the Supervisor attribute the failure to a circuit.
        adapter_id: Option<String>,
        failed_at: DateTime<Utc>,
    },
    RetryRole {
        task_id: String,
        role: Role,
        skip_adapter: Option<String>,
        reason: String,
    },
    QualityConcern {
        task_id: String,
        role: Role,
        confidence: f64,
        concern: String,
        adapter_id: String,
    },
    SubTaskCompleted {
        parent_task_id: String,
        child_task_id: String,
    },
    SubTaskFailed {
        parent_task_id: String,
        child_task_id: String,
        error: String,
    },
}

/// A single reviewer vote ingested by the Consensus Collector. `confidence`
/// is clamped to `[0, 1]` at construction so a malformed vote can never
/// invert the `weighted` strategy's sign regardless of transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub voter_id: String,
    pub approved: bool,
    pub confidence: f64,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl ConsensusVote {
    pub fn new(voter_id: impl Into<String>, approved: bool, confidence: f64, feedback: Option<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            approved,
            confidence: confidence.clamp(0.0, 1.0),
            feedback,
        }
    }
}
