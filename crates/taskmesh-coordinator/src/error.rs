use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Core(#[from] taskmesh_core::CoreError),

    #[error(transparent)]
    Workers(#[from] taskmesh_workers::WorkersError),

    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("task '{0}' has no coordinator registered")]
    CoordinatorNotFound(String),

    #[error("sub-task depth {depth} exceeds the configured cap of {max_depth}")]
    DepthCapExceeded { depth: u32, max_depth: u32 },

    #[error("cannot {action} task '{task_id}' in its current state")]
    InvalidTransition { task_id: String, action: String },

    #[error("GOAP planner found no route to a goal state for task '{0}'")]
    PlanUnreachable(String),

    #[error("supervisor is shutting down; no new tasks are accepted")]
    ShuttingDown,
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
