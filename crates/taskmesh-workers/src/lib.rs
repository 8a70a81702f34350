pub mod consensus;
pub mod error;
pub mod prompts;
pub mod role_handler;
pub mod verdict;

pub use consensus::{ConsensusCollector, ConsensusOutcome, CONSENSUS_ROUND_DEADLINE_SECONDS};
pub use error::{WorkersError, WorkersResult};
pub use prompts::RolePrompts;
pub use role_handler::{BuilderHandler, PlannerHandler, ReviewerHandler, RoleHandler, RoleRequest};
pub use verdict::resolve_reviewer_verdict;
