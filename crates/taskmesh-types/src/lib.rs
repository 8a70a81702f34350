pub mod adapter;
pub mod blackboard;
pub mod circuit;
pub mod config;
pub mod event;
pub mod goap;
pub mod messages;
pub mod task;
pub mod world_state;

pub use adapter::{AdapterConfig, SandboxKind};
pub use blackboard::{BlackboardEntry, BlackboardScope};
pub use circuit::{CircuitInfo, CircuitState};
pub use config::{ConfigError, ConsensusStrategy, RuntimeConfig};
pub use event::{
    event_types, EventEnvelope, EventPayload, ACTION_RECEIVED, TASK_DONE, TASK_FAILED,
    UI_PATCH, UI_SURFACE,
};
pub use goap::{action_catalogue, ActionName, GoapAction, GoapPlan};
pub use messages::{ConsensusVote, Role, RoleMessage};
pub use task::{Task, TaskSnapshot, TaskStatus};
pub use world_state::{WorldState, WorldStateKey};
