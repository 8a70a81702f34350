use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkersError {
    #[error(transparent)]
    Core(#[from] taskmesh_core::CoreError),

    #[error("consensus vote received for closed round '{round_id}'")]
    VoteAfterClose { round_id: String },

    #[error("consensus round '{round_id}' timed out with {votes_received} of {votes_required} votes")]
    ConsensusTimeout {
        round_id: String,
        votes_received: u32,
        votes_required: u32,
    },
}

pub type WorkersResult<T> = Result<T, WorkersError>;
