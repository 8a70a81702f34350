use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::Level;

use taskmesh_observability::{emit_event, ObservabilityEvent, ProcessKind};
use taskmesh_types::config::ConsensusStrategy;
use taskmesh_types::messages::ConsensusVote;

use crate::error::{WorkersError, WorkersResult};

/// Default window a round stays open before it is considered timed out.
pub const CONSENSUS_ROUND_DEADLINE_SECONDS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusOutcome {
    Approved { mean_confidence: f64 },
    Rejected { mean_confidence: f64 },
    Disputed,
}

struct RoundState {
    votes_required: u32,
    strategy: ConsensusStrategy,
    votes: Vec<ConsensusVote>,
    opened_at: DateTime<Utc>,
    closed: bool,
}

/// Aggregates N reviewer votes for a task into one outcome. A round can
/// receive votes before it is formally opened — a vote that arrives before
/// the round is registered is buffered, not dropped — so `record_vote`
/// lazily creates the round state if needed.
#[derive(Clone)]
pub struct ConsensusCollector {
    rounds: Arc<RwLock<HashMap<String, RoundState>>>,
}

impl ConsensusCollector {
    pub fn new() -> Self {
        Self {
            rounds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn open_round(&self, round_id: impl Into<String>, votes_required: u32, strategy: ConsensusStrategy) {
        let round_id = round_id.into();
        let mut rounds = self.rounds.write().await;
        let entry = rounds.entry(round_id).or_insert_with(|| RoundState {
            votes_required,
            strategy,
            votes: Vec::new(),
            opened_at: Utc::now(),
            closed: false,
        });
        // A buffered vote may have created the entry with a placeholder
        // strategy/count before the round was formally opened; reconcile.
        entry.votes_required = votes_required;
        entry.strategy = strategy;
    }

    pub async fn record_vote(&self, round_id: impl Into<String>, vote: ConsensusVote) -> WorkersResult<()> {
        let round_id = round_id.into();
        let mut rounds = self.rounds.write().await;
        let entry = rounds.entry(round_id.clone()).or_insert_with(|| RoundState {
            votes_required: u32::MAX,
            strategy: ConsensusStrategy::Majority,
            votes: Vec::new(),
            opened_at: Utc::now(),
            closed: false,
        });

        if entry.closed {
            return Err(WorkersError::VoteAfterClose { round_id });
        }

        entry.votes.push(vote);
        Ok(())
    }

    /// Evaluates the round if enough votes are in, or if the deadline has
    /// elapsed. Returns `None` while still waiting with no timeout yet.
    pub async fn try_resolve(&self, round_id: &str) -> WorkersResult<Option<ConsensusOutcome>> {
        let mut rounds = self.rounds.write().await;
        let Some(entry) = rounds.get_mut(round_id) else {
            return Ok(None);
        };

        if entry.closed {
            return Ok(None);
        }

        let elapsed = Utc::now() - entry.opened_at;
        let have_quorum = entry.votes.len() as u32 >= entry.votes_required;
        let timed_out = elapsed.num_seconds() >= CONSENSUS_ROUND_DEADLINE_SECONDS;

        if !have_quorum && !timed_out {
            return Ok(None);
        }

        if timed_out && !have_quorum {
            entry.closed = true;
            return Err(WorkersError::ConsensusTimeout {
                round_id: round_id.to_string(),
                votes_received: entry.votes.len() as u32,
                votes_required: entry.votes_required,
            });
        }

        entry.closed = true;
        let outcome = resolve(&entry.votes, entry.strategy);
        emit_event(
            Level::INFO,
            ProcessKind::Supervisor,
            ObservabilityEvent {
                event: "consensus.resolved",
                component: "consensus_collector",
                correlation_id: None,
                task_id: None,
                role: None,
                adapter_id: None,
                status: Some(match outcome {
                    ConsensusOutcome::Approved { .. } => "approved",
                    ConsensusOutcome::Rejected { .. } => "rejected",
                    ConsensusOutcome::Disputed => "disputed",
                }),
                error_code: None,
                detail: Some(round_id),
            },
        );
        Ok(Some(outcome))
    }
}

impl Default for ConsensusCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(votes: &[ConsensusVote], strategy: ConsensusStrategy) -> ConsensusOutcome {
    if votes.is_empty() {
        return ConsensusOutcome::Disputed;
    }

    let mean_confidence = votes.iter().map(|v| v.confidence).sum::<f64>() / votes.len() as f64;
    let approvals = votes.iter().filter(|v| v.approved).count();

    match strategy {
        ConsensusStrategy::Unanimous => {
            if approvals == votes.len() {
                ConsensusOutcome::Approved { mean_confidence }
            } else if approvals == 0 {
                ConsensusOutcome::Rejected { mean_confidence }
            } else {
                ConsensusOutcome::Disputed
            }
        }
        ConsensusStrategy::Majority => {
            let half = votes.len() as f64 / 2.0;
            if approvals as f64 > half {
                ConsensusOutcome::Approved { mean_confidence }
            } else if (approvals as f64) < half {
                ConsensusOutcome::Rejected { mean_confidence }
            } else {
                ConsensusOutcome::Disputed
            }
        }
        ConsensusStrategy::Weighted => {
            let approve_weight: f64 = votes.iter().filter(|v| v.approved).map(|v| v.confidence).sum();
            let reject_weight: f64 = votes.iter().filter(|v| !v.approved).map(|v| v.confidence).sum();

            if approve_weight > reject_weight {
                ConsensusOutcome::Approved { mean_confidence }
            } else if reject_weight > approve_weight {
                ConsensusOutcome::Rejected { mean_confidence }
            } else {
                ConsensusOutcome::Disputed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(approved: bool, confidence: f64) -> ConsensusVote {
        ConsensusVote::new("v", approved, confidence, None)
    }

    #[tokio::test]
    async fn majority_approves_with_two_of_three() {
        let collector = ConsensusCollector::new();
        collector.open_round("r1", 3, ConsensusStrategy::Majority).await;
        collector.record_vote("r1", vote(true, 0.9)).await.unwrap();
        collector.record_vote("r1", vote(true, 0.8)).await.unwrap();
        collector.record_vote("r1", vote(false, 0.7)).await.unwrap();

        let outcome = collector.try_resolve("r1").await.unwrap().unwrap();
        assert!(matches!(outcome, ConsensusOutcome::Approved { .. }));
    }

    #[tokio::test]
    async fn unanimous_strategy_disputes_a_split_vote() {
        let collector = ConsensusCollector::new();
        collector.open_round("r1", 2, ConsensusStrategy::Unanimous).await;
        collector.record_vote("r1", vote(true, 0.9)).await.unwrap();
        collector.record_vote("r1", vote(false, 0.9)).await.unwrap();

        let outcome = collector.try_resolve("r1").await.unwrap().unwrap();
        assert_eq!(outcome, ConsensusOutcome::Disputed);
    }

    #[tokio::test]
    async fn weighted_strategy_breaks_ties_by_confidence() {
        let collector = ConsensusCollector::new();
        collector.open_round("r1", 2, ConsensusStrategy::Weighted).await;
        collector.record_vote("r1", vote(true, 0.9)).await.unwrap();
        collector.record_vote("r1", vote(false, 0.3)).await.unwrap();

        let outcome = collector.try_resolve("r1").await.unwrap().unwrap();
        assert!(matches!(outcome, ConsensusOutcome::Approved { .. }));
    }

    #[tokio::test]
    async fn vote_before_open_is_buffered_not_dropped() {
        let collector = ConsensusCollector::new();
        collector.record_vote("r1", vote(true, 0.9)).await.unwrap();
        collector.open_round("r1", 1, ConsensusStrategy::Majority).await;

        let outcome = collector.try_resolve("r1").await.unwrap().unwrap();
        assert!(matches!(outcome, ConsensusOutcome::Approved { .. }));
    }

    #[tokio::test]
    async fn vote_after_close_is_rejected() {
        let collector = ConsensusCollector::new();
        collector.open_round("r1", 1, ConsensusStrategy::Majority).await;
        collector.record_vote("r1", vote(true, 0.9)).await.unwrap();
        collector.try_resolve("r1").await.unwrap();

        let result = collector.record_vote("r1", vote(true, 0.9)).await;
        assert!(matches!(result, Err(WorkersError::VoteAfterClose { .. })));
    }
}
