use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use taskmesh_core::{Blackboard, EventBus};
use taskmesh_types::config::ConsensusStrategy;
use taskmesh_types::event::event_types;
use taskmesh_types::goap::ActionName;
use taskmesh_types::messages::{Role, RoleMessage};
use taskmesh_types::task::{Task, TaskStatus};
use taskmesh_types::world_state::{WorldState, WorldStateKey};
use taskmesh_workers::{resolve_reviewer_verdict, ConsensusOutcome};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::task_registry::TaskRegistry;

/// What the Coordinator wants the Supervisor to do next after a `step()`
/// call. The
/// Coordinator never talks to an adapter itself — it only ever asks for a
/// role to be dispatched and waits for the matching `RoleMessage` to come
/// back via `apply_role_message`.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Dispatch this role and feed the result back via `apply_role_message`.
    DispatchRole { role: Role, preferred_adapter: Option<String> },
    /// Spawn these sub-tasks (title, description) under this task, bounded
    /// by the depth cap.
    SpawnSubTasks(Vec<(String, String)>),
    /// Open a consensus round of `votes_required` reviewer votes under
    /// `round_id` and feed the resolution back via `apply_consensus_outcome`.
    DispatchReviewConsensus { votes_required: u32, round_id: String },
    /// The task reached a terminal status.
    Terminal,
    /// Paused by a human intervention; nothing to do until resumed.
    Paused,
    /// No action is currently runnable and the task is not terminal — the
    /// coordinator is waiting on an external signal (sub-task completion,
    /// a human vote).
    Idle,
    /// An internal-only transition happened (e.g. `Rework` reset the build
    /// output); call `step()` again immediately, there's nothing to await.
    Continue,
}

/// Per-task single-threaded state machine: computes world state, asks the
/// GOAP planner for the next action, and drives `Task` through its lifecycle
/// Owned exclusively by its Supervisor for
/// the task's lifetime; never shared behind a lock with another task.
pub struct TaskCoordinator {
    pub task: Task,
    pub retry_count: u32,
    pub depth: u32,
    pub max_depth: u32,
    pub max_retries: u32,
    pub paused: bool,
    pub review_passed: bool,
    pub review_rejected: bool,
    pub consensus_reached: bool,
    pub consensus_disputed: bool,
    pub sub_tasks_spawned: bool,
    pub pending_children: usize,
    pub adapter_available: bool,
    pub quality_concern_count: u32,
    pub quality_concern_retry_threshold: u32,
    pub review_consensus_count: u32,
    pub review_consensus_strategy: ConsensusStrategy,
    pending_subtask_specs: Vec<(String, String)>,
    events: EventBus,
    blackboard: Blackboard,
}

/// Scans a Planner output for per-line `SUBTASK: <title>|<description>`
/// markers, mirroring the structured-section convention the role prompts
/// already ask adapters to follow. Unlike a whole-output prefix, this finds
/// markers anywhere a planner chooses to place them among its prose.
fn parse_subtask_lines(output: &str) -> Vec<(String, String)> {
    let mut children = Vec::new();
    for line in output.lines() {
        let Some(body) = line.trim().strip_prefix("SUBTASK:") else {
            continue;
        };
        let mut parts = body.splitn(2, '|');
        let Some(title) = parts.next() else { continue };
        let title = title.trim().to_string();
        let description = parts.next().unwrap_or("").trim().to_string();
        if !title.is_empty() {
            children.push((title, description));
        }
    }
    children
}

/// Lowercased, punctuation-stripped words of at least 3 characters, used to
/// detect a "sibling task with matching keywords" per the global blackboard.
fn keywords(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 2)
        .collect()
}

impl TaskCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task: Task,
        depth: u32,
        max_depth: u32,
        max_retries: u32,
        events: EventBus,
        blackboard: Blackboard,
        review_consensus_count: u32,
        review_consensus_strategy: ConsensusStrategy,
    ) -> Self {
        Self {
            task,
            retry_count: 0,
            depth,
            max_depth,
            max_retries,
            paused: false,
            review_passed: false,
            review_rejected: false,
            consensus_reached: false,
            consensus_disputed: false,
            sub_tasks_spawned: false,
            pending_children: 0,
            adapter_available: true,
            quality_concern_count: 0,
            quality_concern_retry_threshold: 2,
            review_consensus_count: review_consensus_count.max(1),
            review_consensus_strategy,
            pending_subtask_specs: Vec::new(),
            events,
            blackboard,
        }
    }

    pub async fn world_state(&self) -> WorldState {
        let mut keys = Vec::new();
        let mut push = |key: WorldStateKey, value: bool| {
            if value {
                keys.push(key);
            }
        };

        push(WorldStateKey::TaskExists, true);
        push(WorldStateKey::AdapterAvailable, self.adapter_available);
        push(WorldStateKey::PlanExists, self.task.planning_output.is_some());
        push(WorldStateKey::BuildExists, self.task.build_output.is_some());
        push(WorldStateKey::ReviewPassed, self.review_passed);
        push(WorldStateKey::ReviewRejected, self.review_rejected);
        push(WorldStateKey::RetryLimitReached, self.retry_count >= self.max_retries);
        push(WorldStateKey::TaskBlocked, matches!(self.task.status, TaskStatus::Blocked));
        push(WorldStateKey::SubTasksSpawned, self.sub_tasks_spawned);
        push(
            WorldStateKey::SubTasksCompleted,
            self.sub_tasks_spawned && self.pending_children == 0,
        );
        push(WorldStateKey::ConsensusReached, self.consensus_reached);
        push(WorldStateKey::ConsensusDisputed, self.consensus_disputed);
        push(WorldStateKey::HighFailureRateDetected, self.high_failure_rate_detected().await);
        push(WorldStateKey::SimilarTaskSucceeded, self.similar_task_succeeded().await);
        push(WorldStateKey::Done, matches!(self.task.status, TaskStatus::Done));

        WorldState::from_true(keys)
    }

    /// Any adapter circuit currently open, or this task's own quality
    /// concerns already at its retry threshold.
    async fn high_failure_rate_detected(&self) -> bool {
        if self.quality_concern_count >= self.quality_concern_retry_threshold {
            return true;
        }
        self.blackboard.global_snapshot().await.iter().any(|entry| {
            entry.key.starts_with("adapter_circuit:")
                && entry.value.get("state").and_then(|v| v.as_str()) == Some("open")
        })
    }

    /// A sibling task (not this one) whose `task_succeeded` signal shares a
    /// keyword with this task's title.
    async fn similar_task_succeeded(&self) -> bool {
        let own_key = format!("task_succeeded:{}", self.task.id);
        let own_keywords = keywords(&self.task.title);
        if own_keywords.is_empty() {
            return false;
        }
        self.blackboard
            .global_snapshot()
            .await
            .iter()
            .filter(|entry| entry.key.starts_with("task_succeeded:") && entry.key != own_key)
            .any(|entry| {
                entry
                    .value
                    .get("title")
                    .and_then(|v| v.as_str())
                    .map(|title| !keywords(title).is_disjoint(&own_keywords))
                    .unwrap_or(false)
            })
    }

    fn round_id(&self) -> String {
        format!("{}-r{}", self.task.id, self.retry_count)
    }

    /// Computes the next action from the current world state and advances
    /// local bookkeeping (status, retries) for actions that don't require
    /// waiting on a role or sub-task. Role dispatch and sub-task spawning
    /// are handed back to the caller rather than performed here, since both
    /// cross a component boundary the Coordinator itself doesn't own.
    pub async fn step(&mut self) -> CoordinatorResult<StepOutcome> {
        if self.paused {
            return Ok(StepOutcome::Paused);
        }

        if matches!(self.task.status, TaskStatus::Done | TaskStatus::Blocked) {
            return Ok(StepOutcome::Terminal);
        }

        if !self.pending_subtask_specs.is_empty() && !self.sub_tasks_spawned {
            let children = std::mem::take(&mut self.pending_subtask_specs);
            return Ok(StepOutcome::SpawnSubTasks(children));
        }

        let state = self.world_state().await;
        let goal = [(WorldStateKey::Done, true)];
        let plan = taskmesh_core::goap::plan(&state, &goal, None);

        if plan.dead_end {
            return Err(CoordinatorError::PlanUnreachable(self.task.id.clone()));
        }

        let Some(next_action) = plan.actions.first().copied() else {
            return Ok(StepOutcome::Terminal);
        };

        self.emit_decision(next_action).await;

        match next_action {
            ActionName::Plan => {
                self.task.status = TaskStatus::Planning;
                self.touch();
                Ok(StepOutcome::DispatchRole {
                    role: Role::Planner,
                    preferred_adapter: None,
                })
            }
            ActionName::Build => {
                self.task.status = TaskStatus::Building;
                self.touch();
                Ok(StepOutcome::DispatchRole {
                    role: Role::Builder,
                    preferred_adapter: None,
                })
            }
            ActionName::Review => {
                self.task.status = TaskStatus::Reviewing;
                self.touch();
                if self.review_consensus_count > 1 {
                    Ok(StepOutcome::DispatchReviewConsensus {
                        votes_required: self.review_consensus_count,
                        round_id: self.round_id(),
                    })
                } else {
                    Ok(StepOutcome::DispatchRole {
                        role: Role::Reviewer,
                        preferred_adapter: None,
                    })
                }
            }
            ActionName::Rework => {
                self.review_rejected = false;
                self.task.build_output = None;
                self.retry_count += 1;
                self.touch();
                Ok(StepOutcome::Continue)
            }
            ActionName::SecondOpinion => {
                // Cancels the disputed round implicitly: a fresh round id
                // (retry_count just advanced) means the Supervisor opens a
                // brand new consensus session rather than reusing the one
                // that came back disputed.
                self.retry_count += 1;
                self.touch();
                Ok(StepOutcome::DispatchReviewConsensus {
                    votes_required: self.review_consensus_count + 1,
                    round_id: self.round_id(),
                })
            }
            ActionName::WaitForSubTasks => Ok(StepOutcome::Idle),
            ActionName::Finalize => {
                self.task.status = TaskStatus::Done;
                self.task.summary = self.task.build_output.clone();
                self.touch();
                self.blackboard
                    .set_global(
                        format!("task_succeeded:{}", self.task.id),
                        serde_json::json!({ "title": self.task.title }),
                        "coordinator",
                    )
                    .await;
                self.emit_done().await;
                tracing::info!(task_id = %self.task.id, "task finalized");
                Ok(StepOutcome::Terminal)
            }
            ActionName::Escalate => {
                self.task.status = TaskStatus::Blocked;
                self.task.error = Some("retry limit reached; escalated for human review".to_string());
                self.touch();
                self.blackboard
                    .set_global(
                        format!("task_blocked:{}", self.task.id),
                        serde_json::json!({ "title": self.task.title }),
                        "coordinator",
                    )
                    .await;
                self.emit_escalated().await;
                tracing::warn!(task_id = %self.task.id, "task escalated and blocked");
                Ok(StepOutcome::Terminal)
            }
        }
    }

    pub async fn apply_role_message(&mut self, message: RoleMessage) -> CoordinatorResult<()> {
        match message {
            RoleMessage::RoleSucceeded { role, output, adapter_id, confidence, .. } => {
                match role {
                    Role::Planner => {
                        let children = parse_subtask_lines(&output);
                        if !children.is_empty() {
                            self.pending_subtask_specs = children;
                        }
                        self.task.planning_output = Some(output);
                    }
                    Role::Builder => {
                        self.task.build_output = Some(output);
                    }
                    Role::Reviewer => {
                        let passed = resolve_reviewer_verdict(&output);
                        self.review_passed = passed;
                        self.review_rejected = !passed;
                        self.task.review_output = Some(output);
                    }
                    Role::Orchestrator => {}
                }
                self.touch();
                self.events
                    .publish(
                        event_types::ROLE_SUCCEEDED,
                        Some(self.task.id.clone()),
                        serde_json::json!({
                            "role": role.as_str(),
                            "adapterId": adapter_id,
                            "confidence": confidence,
                        }),
                    )
                    .await;
                Ok(())
            }
            RoleMessage::RoleFailed { role, error, retriable, .. } => {
                if role == Role::Reviewer {
                    self.review_rejected = true;
                } else if retriable {
                    self.retry_count += 1;
                } else {
                    self.task.status = TaskStatus::Blocked;
                    self.task.error = Some(error.clone());
                }
                self.touch();
                self.events
                    .publish(
                        event_types::ROLE_FAILED,
                        Some(self.task.id.clone()),
                        serde_json::json!({ "role": role.as_str(), "error": error, "retriable": retriable }),
                    )
                    .await;
                Ok(())
            }
            RoleMessage::QualityConcern { role, confidence, concern, adapter_id, .. } => {
                self.quality_concern_count += 1;
                if role == Role::Reviewer {
                    // a low-confidence review is treated as a rejection, not a pass
                    self.review_rejected = true;
                }
                self.events
                    .publish(
                        event_types::TELEMETRY_QUALITY,
                        Some(self.task.id.clone()),
                        serde_json::json!({
                            "role": role.as_str(),
                            "confidence": confidence,
                            "concern": concern,
                            "adapterId": adapter_id,
                        }),
                    )
                    .await;
                if self.quality_concern_count >= self.quality_concern_retry_threshold {
                    self.retry_count += 1;
                }
                Ok(())
            }
            RoleMessage::SubTaskCompleted { child_task_id, .. } => {
                self.pending_children = self.pending_children.saturating_sub(1);
                if self.pending_children == 0 {
                    // Sub-tasks stand in for a direct build: their
                    // completion is what satisfies `BuildExists` for the
                    // parent so it still goes through Review like any
                    // other task.
                    self.task.build_output = Some(format!(
                        "{}completed sub-task {child_task_id}",
                        self.task
                            .build_output
                            .as_deref()
                            .map(|s| format!("{s}\n"))
                            .unwrap_or_default()
                    ));
                }
                Ok(())
            }
            RoleMessage::SubTaskFailed { child_task_id, error, .. } => {
                self.pending_children = self.pending_children.saturating_sub(1);
                self.task.error = Some(format!("sub-task {child_task_id} failed: {error}"));
                Ok(())
            }
            RoleMessage::RetryRole { .. } => Ok(()),
            RoleMessage::ExecuteRole { .. } => Ok(()),
        }
    }

    /// Applies the terminal result of a reviewer consensus round. A
    /// `Disputed` outcome does not fail the task — it leaves
    /// `ConsensusDisputed=true` so the next `step()` routes through
    /// `SecondOpinion` rather than straight to `Rework`/`Escalate`.
    pub async fn apply_consensus_outcome(&mut self, outcome: ConsensusOutcome) -> CoordinatorResult<()> {
        let status = match outcome {
            ConsensusOutcome::Approved { .. } => {
                self.review_passed = true;
                self.review_rejected = false;
                self.consensus_reached = true;
                self.consensus_disputed = false;
                "approved"
            }
            ConsensusOutcome::Rejected { .. } => {
                self.review_passed = false;
                self.review_rejected = true;
                self.consensus_reached = true;
                self.consensus_disputed = false;
                "rejected"
            }
            ConsensusOutcome::Disputed => {
                self.consensus_reached = false;
                self.consensus_disputed = true;
                "disputed"
            }
        };
        self.task.review_output = Some(format!("consensus:{status}"));
        self.touch();
        self.events
            .publish(
                event_types::TELEMETRY_CONSENSUS,
                Some(self.task.id.clone()),
                serde_json::json!({ "status": status }),
            )
            .await;
        Ok(())
    }

    pub fn spawn_sub_task_ids(&mut self, count: usize) -> CoordinatorResult<Vec<String>> {
        if self.depth + 1 > self.max_depth {
            return Err(CoordinatorError::DepthCapExceeded {
                depth: self.depth + 1,
                max_depth: self.max_depth,
            });
        }
        self.sub_tasks_spawned = true;
        self.pending_children += count;
        Ok((0..count).map(|_| Uuid::new_v4().to_string()).collect())
    }

    // --- human intervention commands ---

    pub fn approve_review(&mut self) -> CoordinatorResult<()> {
        if !matches!(self.task.status, TaskStatus::Reviewing) {
            return Err(CoordinatorError::InvalidTransition {
                task_id: self.task.id.clone(),
                action: "approve_review".to_string(),
            });
        }
        self.review_passed = true;
        self.review_rejected = false;
        self.touch();
        Ok(())
    }

    pub fn reject_review(&mut self, reason: impl Into<String>) -> CoordinatorResult<()> {
        if !matches!(self.task.status, TaskStatus::Reviewing) {
            return Err(CoordinatorError::InvalidTransition {
                task_id: self.task.id.clone(),
                action: "reject_review".to_string(),
            });
        }
        self.review_rejected = true;
        self.review_passed = false;
        self.task.error = Some(reason.into());
        self.touch();
        Ok(())
    }

    pub fn request_rework(&mut self) -> CoordinatorResult<()> {
        self.review_rejected = true;
        self.review_passed = false;
        self.task.build_output = None;
        self.touch();
        Ok(())
    }

    pub fn pause_task(&mut self) {
        self.paused = true;
    }

    pub fn resume_task(&mut self) {
        self.paused = false;
    }

    pub fn set_subtask_depth(&mut self, max_depth: u32) {
        self.max_depth = max_depth;
    }

    fn touch(&mut self) {
        self.task.updated_at = Utc::now();
    }

    async fn emit_decision(&self, action: ActionName) {
        self.events
            .publish(
                event_types::TASK_DECISION,
                Some(self.task.id.clone()),
                serde_json::json!({ "action": action.as_str() }),
            )
            .await;
    }

    async fn emit_done(&self) {
        self.events
            .publish(
                event_types::TASK_DONE,
                Some(self.task.id.clone()),
                serde_json::json!({ "summary": self.task.summary }),
            )
            .await;
    }

    async fn emit_escalated(&self) {
        self.events
            .publish(
                event_types::TASK_ESCALATED,
                Some(self.task.id.clone()),
                serde_json::json!({ "error": self.task.error }),
            )
            .await;
    }

    pub async fn write_registry_snapshot(&self, registry: &TaskRegistry) {
        let snapshot = self.task.to_snapshot(self.retry_count, self.depth, self.paused);
        registry.update(snapshot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_coordinator() -> TaskCoordinator {
        let events = EventBus::new(50);
        let blackboard = Blackboard::new(events.clone());
        let task = Task::new("t1", "title", "description");
        TaskCoordinator::new(task, 0, 3, 3, events, blackboard, 1, ConsensusStrategy::Majority)
    }

    fn new_coordinator_with_consensus(count: u32, strategy: ConsensusStrategy) -> TaskCoordinator {
        let events = EventBus::new(50);
        let blackboard = Blackboard::new(events.clone());
        let task = Task::new("t1", "title", "description");
        TaskCoordinator::new(task, 0, 3, 3, events, blackboard, count, strategy)
    }

    #[tokio::test]
    async fn fresh_task_dispatches_planner_first() {
        let mut coordinator = new_coordinator();
        match coordinator.step().await.unwrap() {
            StepOutcome::DispatchRole { role, .. } => assert_eq!(role, Role::Planner),
            other => panic!("expected DispatchRole(Planner), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_happy_path_reaches_done() {
        let mut coordinator = new_coordinator();

        // Plan
        coordinator.step().await.unwrap();
        coordinator
            .apply_role_message(RoleMessage::RoleSucceeded {
                task_id: "t1".to_string(),
                role: Role::Planner,
                output: "plan".to_string(),
                confidence: 0.9,
                adapter_id: "a1".to_string(),
                completed_at: Utc::now(),
            })
            .await
            .unwrap();

        // Build
        coordinator.step().await.unwrap();
        coordinator
            .apply_role_message(RoleMessage::RoleSucceeded {
                task_id: "t1".to_string(),
                role: Role::Builder,
                output: "build".to_string(),
                confidence: 0.9,
                adapter_id: "a1".to_string(),
                completed_at: Utc::now(),
            })
            .await
            .unwrap();

        // Review
        coordinator.step().await.unwrap();
        coordinator
            .apply_role_message(RoleMessage::RoleSucceeded {
                task_id: "t1".to_string(),
                role: Role::Reviewer,
                output: "approved".to_string(),
                confidence: 0.9,
                adapter_id: "a1".to_string(),
                completed_at: Utc::now(),
            })
            .await
            .unwrap();

        // Finalize
        let outcome = coordinator.step().await.unwrap();
        assert!(matches!(outcome, StepOutcome::Terminal));
        assert!(matches!(coordinator.task.status, TaskStatus::Done));
    }

    #[tokio::test]
    async fn paused_task_does_not_advance() {
        let mut coordinator = new_coordinator();
        coordinator.pause_task();
        let outcome = coordinator.step().await.unwrap();
        assert!(matches!(outcome, StepOutcome::Paused));
    }

    #[tokio::test]
    async fn depth_cap_rejects_spawn_past_the_limit() {
        let mut coordinator = new_coordinator();
        coordinator.depth = 3;
        coordinator.max_depth = 3;
        let result = coordinator.spawn_sub_task_ids(1);
        assert!(matches!(result, Err(CoordinatorError::DepthCapExceeded { .. })));
    }

    #[tokio::test]
    async fn retry_limit_reached_escalates_instead_of_looping() {
        let mut coordinator = new_coordinator();
        coordinator.max_retries = 0;
        coordinator.task.build_output = Some("b".to_string());
        coordinator.task.planning_output = Some("p".to_string());
        coordinator.review_rejected = true;

        let outcome = coordinator.step().await.unwrap();
        assert!(matches!(outcome, StepOutcome::Terminal));
        assert!(matches!(coordinator.task.status, TaskStatus::Blocked));
    }

    #[tokio::test]
    async fn multi_reviewer_review_opens_a_consensus_round_not_a_single_dispatch() {
        let mut coordinator = new_coordinator_with_consensus(3, ConsensusStrategy::Majority);
        coordinator.task.planning_output = Some("p".to_string());
        coordinator.task.build_output = Some("b".to_string());

        match coordinator.step().await.unwrap() {
            StepOutcome::DispatchReviewConsensus { votes_required, .. } => {
                assert_eq!(votes_required, 3);
            }
            other => panic!("expected DispatchReviewConsensus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disputed_consensus_routes_through_second_opinion_with_one_more_vote() {
        let mut coordinator = new_coordinator_with_consensus(3, ConsensusStrategy::Majority);
        coordinator.task.planning_output = Some("p".to_string());
        coordinator.task.build_output = Some("b".to_string());
        coordinator
            .apply_consensus_outcome(ConsensusOutcome::Disputed)
            .await
            .unwrap();

        match coordinator.step().await.unwrap() {
            StepOutcome::DispatchReviewConsensus { votes_required, .. } => {
                assert_eq!(votes_required, 4);
            }
            other => panic!("expected DispatchReviewConsensus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finalize_writes_task_succeeded_to_the_global_blackboard() {
        let mut coordinator = new_coordinator();
        coordinator.task.planning_output = Some("p".to_string());
        coordinator.task.build_output = Some("b".to_string());
        coordinator.review_passed = true;

        coordinator.step().await.unwrap();

        let entry = coordinator.blackboard.get_global("task_succeeded:t1").await;
        assert!(entry.is_some());
    }

    #[tokio::test]
    async fn escalate_writes_task_blocked_to_the_global_blackboard() {
        let mut coordinator = new_coordinator();
        coordinator.max_retries = 0;
        coordinator.task.build_output = Some("b".to_string());
        coordinator.task.planning_output = Some("p".to_string());
        coordinator.review_rejected = true;

        coordinator.step().await.unwrap();

        let entry = coordinator.blackboard.get_global("task_blocked:t1").await;
        assert!(entry.is_some());
    }

    #[tokio::test]
    async fn high_failure_rate_detected_when_an_adapter_circuit_is_open() {
        let coordinator = new_coordinator();
        coordinator
            .blackboard
            .set_global(
                "adapter_circuit:fail",
                serde_json::json!({ "state": "open" }),
                "supervisor",
            )
            .await;

        let state = coordinator.world_state().await;
        assert!(state.get(WorldStateKey::HighFailureRateDetected));
    }

    #[tokio::test]
    async fn similar_task_succeeded_when_a_sibling_shares_a_keyword() {
        let coordinator = new_coordinator();
        coordinator
            .blackboard
            .set_global(
                "task_succeeded:other",
                serde_json::json!({ "title": "title of another task" }),
                "coordinator",
            )
            .await;

        let state = coordinator.world_state().await;
        assert!(state.get(WorldStateKey::SimilarTaskSucceeded));
    }

    #[test]
    fn parse_subtask_lines_scans_any_line_not_just_a_whole_output_prefix() {
        let output = "Some prose first.\nSUBTASK: first|do the first thing\nmore prose\nSUBTASK: second|do the second thing\n";
        let parsed = parse_subtask_lines(output);
        assert_eq!(
            parsed,
            vec![
                ("first".to_string(), "do the first thing".to_string()),
                ("second".to_string(), "do the second thing".to_string()),
            ]
        );
    }
}
