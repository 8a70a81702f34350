use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use chrono::{DateTime, Utc};
use taskmesh_core::{AdapterExecutor, Blackboard, CircuitBreakers, EventBus};
use taskmesh_types::config::RuntimeConfig;
use taskmesh_types::event::event_types;
use taskmesh_types::messages::{ConsensusVote, Role, RoleMessage};
use taskmesh_types::task::Task;
use taskmesh_workers::{
    resolve_reviewer_verdict, BuilderHandler, ConsensusCollector, ConsensusOutcome, PlannerHandler, ReviewerHandler,
    RoleHandler, RoleRequest,
};

use crate::coordinator::{StepOutcome, TaskCoordinator};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::task_registry::TaskRegistry;

/// Owns every `TaskCoordinator`, the role handlers, the consensus collector
/// and the per-adapter circuit breakers. Each task's coordinator is driven to its next dispatch
/// point, one at a time, so there is never more than one mutable borrow of a
/// given task's state outstanding.
pub struct Supervisor {
    config: RuntimeConfig,
    coordinators: Arc<RwLock<HashMap<String, TaskCoordinator>>>,
    planner: PlannerHandler,
    builder: BuilderHandler,
    reviewer: ReviewerHandler,
    consensus: ConsensusCollector,
    circuits: CircuitBreakers,
    registry: TaskRegistry,
    events: EventBus,
    blackboard: Blackboard,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(config: RuntimeConfig, events: EventBus, registry: TaskRegistry, blackboard: Blackboard) -> Self {
        let circuits = CircuitBreakers::new(config.adapter_circuit_threshold, config.adapter_circuit_duration_seconds);
        let executor = AdapterExecutor::new(circuits.clone());
        let adapters = config.adapters.clone();

        Self {
            planner: PlannerHandler::new(executor.clone(), adapters.clone(), config.role_execution_timeout_seconds, 0.3),
            builder: BuilderHandler::new(executor.clone(), adapters.clone(), config.role_execution_timeout_seconds, 0.3),
            reviewer: ReviewerHandler::new(executor, adapters, config.role_execution_timeout_seconds, 0.3),
            consensus: ConsensusCollector::new(),
            circuits,
            registry,
            events,
            blackboard,
            coordinators: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Cancels the cooperative shutdown token. Every coordinator currently
    /// being driven notices at its next dispatch boundary and stops rather
    /// than starting another role; it does not abort a role call already in
    /// flight. Call this once, then wait on the HTTP server's own graceful
    /// shutdown to let in-flight requests finish draining.
    pub fn shutdown(&self) {
        tracing::info!("supervisor shutdown requested, refusing new dispatches");
        self.shutdown.cancel();
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Submits a new top-level task and drives it to its first dispatch
    /// point or terminal state.
    pub async fn submit_task(&self, title: impl Into<String>, description: impl Into<String>) -> CoordinatorResult<String> {
        if self.shutting_down() {
            return Err(CoordinatorError::ShuttingDown);
        }
        let task = Task::new(Uuid::new_v4().to_string(), title, description);
        let task_id = task.id.clone();
        tracing::info!(task_id = %task_id, "task submitted");
        self.submit_with_parent(task, 0).await
    }

    async fn submit_with_parent(&self, task: Task, depth: u32) -> CoordinatorResult<String> {
        let task_id = task.id.clone();
        let coordinator = TaskCoordinator::new(
            task,
            depth,
            self.config.default_max_sub_task_depth,
            self.config.max_retries_per_task,
            self.events.clone(),
            self.blackboard.clone(),
            self.config.review_consensus_count,
            self.config.review_consensus_strategy,
        );
        coordinator.write_registry_snapshot(&self.registry).await;

        {
            let mut coordinators = self.coordinators.write().await;
            coordinators.insert(task_id.clone(), coordinator);
        }

        self.drive(&task_id).await?;
        Ok(task_id)
    }

    /// Repeatedly steps the coordinator, dispatching roles as they come up,
    /// until it reaches a terminal, paused, or genuinely waiting state.
    pub async fn drive(&self, task_id: &str) -> CoordinatorResult<()> {
        loop {
            if self.shutting_down() {
                tracing::debug!(task_id = %task_id, "shutdown in progress, leaving task at its last persisted step");
                return Ok(());
            }

            let outcome = {
                let mut coordinators = self.coordinators.write().await;
                let coordinator = coordinators
                    .get_mut(task_id)
                    .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
                coordinator.step().await?
            };

            self.persist(task_id).await;

            match outcome {
                StepOutcome::Continue => continue,
                StepOutcome::DispatchRole { role, preferred_adapter } => {
                    let message = self.dispatch(task_id, role, preferred_adapter).await?;
                    let retry_needed = self.apply_message(task_id, message).await?;
                    self.persist(task_id).await;
                    if retry_needed {
                        self.retry_with_fallback(task_id, role).await?;
                    }
                    continue;
                }
                StepOutcome::SpawnSubTasks(children) => {
                    self.spawn_children(task_id, children).await?;
                    continue;
                }
                StepOutcome::DispatchReviewConsensus { votes_required, round_id } => {
                    self.run_consensus_round(task_id, votes_required, &round_id).await?;
                    self.persist(task_id).await;
                    continue;
                }
                StepOutcome::Terminal => {
                    self.notify_parent_on_completion(task_id).await?;
                    return Ok(());
                }
                StepOutcome::Paused | StepOutcome::Idle => return Ok(()),
            }
        }
    }

    /// A sub-task reaching a terminal state is not visible to its parent
    /// coordinator on its own — the parent only tracks a pending count, so
    /// each finished child reports back explicitly. The parent is then
    /// driven again in case this was its last outstanding child.
    async fn notify_parent_on_completion(&self, task_id: &str) -> CoordinatorResult<()> {
        let (parent_id, status, error) = {
            let coordinators = self.coordinators.read().await;
            let Some(coordinator) = coordinators.get(task_id) else {
                return Ok(());
            };
            let Some(parent_id) = coordinator.task.parent_task_id.clone() else {
                return Ok(());
            };
            (parent_id, coordinator.task.status, coordinator.task.error.clone())
        };

        let message = if matches!(status, taskmesh_types::task::TaskStatus::Done) {
            RoleMessage::SubTaskCompleted {
                parent_task_id: parent_id.clone(),
                child_task_id: task_id.to_string(),
            }
        } else {
            RoleMessage::SubTaskFailed {
                parent_task_id: parent_id.clone(),
                child_task_id: task_id.to_string(),
                error: error.unwrap_or_else(|| "sub-task blocked".to_string()),
            }
        };

        {
            let mut coordinators = self.coordinators.write().await;
            if let Some(parent) = coordinators.get_mut(&parent_id) {
                parent.apply_role_message(message).await?;
            } else {
                return Ok(());
            }
        }

        self.persist(&parent_id).await;
        Box::pin(self.drive(&parent_id)).await
    }

    async fn dispatch(&self, task_id: &str, role: Role, preferred_adapter: Option<String>) -> CoordinatorResult<RoleMessage> {
        let (title, description, plan_output, build_output) = {
            let coordinators = self.coordinators.read().await;
            let coordinator = coordinators
                .get(task_id)
                .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
            (
                coordinator.task.title.clone(),
                coordinator.task.description.clone(),
                coordinator.task.planning_output.clone(),
                coordinator.task.build_output.clone(),
            )
        };

        let request = RoleRequest {
            task_id: task_id.to_string(),
            title,
            description,
            plan_output,
            build_output,
            preferred_adapter,
            skip_adapter: None,
        };

        Ok(match role {
            Role::Planner => self.planner.execute(request).await,
            Role::Builder => self.builder.execute(request).await,
            Role::Reviewer => self.reviewer.execute(request).await,
            Role::Orchestrator => RoleMessage::RoleFailed {
                task_id: task_id.to_string(),
                role,
                error: "orchestrator role has no adapter-backed handler".to_string(),
                retriable: false,
                adapter_id: None,
                failed_at: chrono::Utc::now(),
            },
        })
    }

    /// Applies the role outcome to the coordinator and tells the circuit
    /// breaker registry about success/failure. Returns `true` if the
    /// Supervisor should immediately retry against a different adapter
    /// after a quality concern.
    async fn apply_message(&self, task_id: &str, message: RoleMessage) -> CoordinatorResult<bool> {
        let retry_needed = matches!(&message, RoleMessage::RoleFailed { retriable: true, .. });

        self.record_circuit_signal(&message).await;

        let mut coordinators = self.coordinators.write().await;
        let coordinator = coordinators
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
        coordinator.apply_role_message(message).await?;
        Ok(retry_needed)
    }

    /// Counts a role outcome toward its adapter's circuit, publishing
    /// `telemetry.circuit` and writing `adapter_circuit:X` to the global
    /// blackboard exactly when the circuit actually transitions — the
    /// Coordinator never sees or decides this, it only reads
    /// `HighFailureRateDetected` back out of the blackboard.
    async fn record_circuit_signal(&self, message: &RoleMessage) {
        match message {
            RoleMessage::RoleSucceeded { adapter_id, .. } => {
                if self.circuits.record_success(adapter_id).await {
                    self.publish_circuit_closed(adapter_id).await;
                }
            }
            RoleMessage::RoleFailed { adapter_id: Some(adapter_id), .. } => {
                if let Some(expires_at) = self.circuits.record_failure(adapter_id).await {
                    self.publish_circuit_opened(adapter_id, expires_at).await;
                }
            }
            _ => {}
        }
    }

    async fn publish_circuit_opened(&self, adapter_id: &str, expires_at: DateTime<Utc>) {
        tracing::warn!(adapter_id, %expires_at, "adapter circuit opened");
        self.blackboard
            .set_global(
                format!("adapter_circuit:{adapter_id}"),
                serde_json::json!({ "state": "open", "until": expires_at }),
                "supervisor",
            )
            .await;
        self.events
            .publish(
                event_types::TELEMETRY_CIRCUIT,
                None,
                serde_json::json!({ "adapterId": adapter_id, "state": "open", "until": expires_at }),
            )
            .await;
    }

    async fn publish_circuit_closed(&self, adapter_id: &str) {
        tracing::info!(adapter_id, "adapter circuit closed");
        self.blackboard
            .set_global(
                format!("adapter_circuit:{adapter_id}"),
                serde_json::json!({ "state": "closed" }),
                "supervisor",
            )
            .await;
        self.events
            .publish(
                event_types::TELEMETRY_CIRCUIT,
                None,
                serde_json::json!({ "adapterId": adapter_id, "state": "closed" }),
            )
            .await;
    }

    /// Opens a consensus round, fans reviewer dispatch out `votes_required`
    /// times, and feeds the resolution back into the coordinator once the
    /// round closes.
    async fn run_consensus_round(&self, task_id: &str, votes_required: u32, round_id: &str) -> CoordinatorResult<()> {
        let strategy = {
            let coordinators = self.coordinators.read().await;
            let coordinator = coordinators
                .get(task_id)
                .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
            coordinator.review_consensus_strategy
        };

        self.consensus.open_round(round_id, votes_required, strategy).await;

        for i in 0..votes_required {
            let message = self.dispatch(task_id, Role::Reviewer, None).await?;
            self.record_circuit_signal(&message).await;

            if let RoleMessage::RoleSucceeded { output, confidence, .. } = &message {
                let approved = resolve_reviewer_verdict(output);
                let vote = ConsensusVote::new(format!("{round_id}-v{i}"), approved, *confidence, None);
                self.consensus.record_vote(round_id, vote).await?;
            }
        }

        if let Some(outcome) = self.consensus.try_resolve(round_id).await? {
            let mut coordinators = self.coordinators.write().await;
            let coordinator = coordinators
                .get_mut(task_id)
                .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
            coordinator.apply_consensus_outcome(outcome).await?;
        }
        Ok(())
    }

    async fn retry_with_fallback(&self, task_id: &str, role: Role) -> CoordinatorResult<()> {
        tracing::debug!(task_id = %task_id, role = role.as_str(), "retrying role against a fallback adapter");
        let message = self.dispatch(task_id, role, None).await?;
        self.apply_message(task_id, message).await?;
        Ok(())
    }

    async fn spawn_children(&self, task_id: &str, children: Vec<(String, String)>) -> CoordinatorResult<()> {
        let parent_depth = {
            let mut coordinators = self.coordinators.write().await;
            let coordinator = coordinators
                .get_mut(task_id)
                .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
            coordinator.spawn_sub_task_ids(children.len())?;
            coordinator.depth
        };

        for (title, description) in children {
            let mut child = Task::new(Uuid::new_v4().to_string(), title, description);
            child.parent_task_id = Some(task_id.to_string());

            {
                let mut coordinators = self.coordinators.write().await;
                if let Some(coordinator) = coordinators.get_mut(task_id) {
                    coordinator.task.sub_task_ids.insert(child.id.clone());
                }
            }

            Box::pin(self.submit_with_parent(child, parent_depth + 1)).await?;
        }

        self.persist(task_id).await;
        Ok(())
    }

    async fn persist(&self, task_id: &str) {
        let coordinators = self.coordinators.read().await;
        if let Some(coordinator) = coordinators.get(task_id) {
            coordinator.write_registry_snapshot(&self.registry).await;
        }
    }

    pub async fn record_consensus_vote(&self, round_id: &str, vote: ConsensusVote) -> CoordinatorResult<()> {
        self.consensus.record_vote(round_id, vote).await?;
        Ok(())
    }

    pub async fn resolve_consensus(&self, round_id: &str) -> CoordinatorResult<Option<ConsensusOutcome>> {
        Ok(self.consensus.try_resolve(round_id).await?)
    }

    // --- human intervention surface ---

    pub async fn approve_review(&self, task_id: &str) -> CoordinatorResult<()> {
        let mut coordinators = self.coordinators.write().await;
        let coordinator = coordinators
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
        coordinator.approve_review()
    }

    pub async fn reject_review(&self, task_id: &str, reason: impl Into<String>) -> CoordinatorResult<()> {
        let mut coordinators = self.coordinators.write().await;
        let coordinator = coordinators
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
        coordinator.reject_review(reason)
    }

    pub async fn request_rework(&self, task_id: &str) -> CoordinatorResult<()> {
        let mut coordinators = self.coordinators.write().await;
        let coordinator = coordinators
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
        coordinator.request_rework()
    }

    pub async fn pause_task(&self, task_id: &str) -> CoordinatorResult<()> {
        {
            let mut coordinators = self.coordinators.write().await;
            let coordinator = coordinators
                .get_mut(task_id)
                .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
            coordinator.pause_task();
        }
        self.persist(task_id).await;
        Ok(())
    }

    pub async fn resume_task(&self, task_id: &str) -> CoordinatorResult<()> {
        {
            let mut coordinators = self.coordinators.write().await;
            let coordinator = coordinators
                .get_mut(task_id)
                .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
            coordinator.resume_task();
        }
        self.drive(task_id).await
    }

    pub async fn set_subtask_depth(&self, task_id: &str, max_depth: u32) -> CoordinatorResult<()> {
        let mut coordinators = self.coordinators.write().await;
        let coordinator = coordinators
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::CoordinatorNotFound(task_id.to_string()))?;
        coordinator.set_subtask_depth(max_depth);
        Ok(())
    }

    pub async fn registry(&self) -> &TaskRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use taskmesh_types::adapter::SandboxKind;
    use taskmesh_types::task::TaskStatus;

    fn config_with_echo_adapter() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.adapters = vec![taskmesh_types::adapter::AdapterConfig {
            id: "echo".to_string(),
            command: "cat".to_string(),
            args: Vec::new(),
            env: StdHashMap::new(),
            working_dir: None,
            sandbox: SandboxKind::Host,
            reliability_prior: 0.8,
        }];
        config.role_execution_timeout_seconds = 5;
        config
    }

    fn build_supervisor() -> Supervisor {
        let events = EventBus::new(200);
        let registry = TaskRegistry::new(events.clone());
        let blackboard = Blackboard::new(events.clone());
        Supervisor::new(config_with_echo_adapter(), events, registry, blackboard)
    }

    fn build_supervisor_with_config(config: RuntimeConfig) -> Supervisor {
        let events = EventBus::new(200);
        let registry = TaskRegistry::new(events.clone());
        let blackboard = Blackboard::new(events.clone());
        Supervisor::new(config, events, registry, blackboard)
    }

    #[tokio::test]
    async fn submitted_task_progresses_past_queued() {
        let supervisor = build_supervisor();
        let task_id = supervisor
            .submit_task("write the changelog", "because the release needs it, verify the result")
            .await
            .unwrap();

        let snapshot = supervisor.registry().await.get(&task_id).await.unwrap();
        assert_ne!(snapshot.task.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn pause_then_resume_eventually_reaches_a_terminal_status() {
        let supervisor = build_supervisor();
        let task_id = supervisor
            .submit_task("implement the fix", "because it is needed, verify the result and changed files")
            .await
            .unwrap();

        supervisor.pause_task(&task_id).await.unwrap();
        let paused_snapshot = supervisor.registry().await.get(&task_id).await.unwrap();
        assert!(paused_snapshot.paused);

        supervisor.resume_task(&task_id).await.unwrap();
        let resumed_snapshot = supervisor.registry().await.get(&task_id).await.unwrap();
        assert!(!resumed_snapshot.paused);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_task_submission() {
        let supervisor = build_supervisor();
        supervisor.shutdown();

        let result = supervisor.submit_task("too late", "arrives after shutdown").await;
        assert!(matches!(result, Err(CoordinatorError::ShuttingDown)));
    }

    #[tokio::test]
    async fn shutdown_mid_flight_leaves_task_at_its_last_persisted_step() {
        let supervisor = build_supervisor();
        let task_id = supervisor
            .submit_task("write the docs", "because they are missing, verify the result")
            .await
            .unwrap();

        let before = supervisor.registry().await.get(&task_id).await.unwrap();
        supervisor.shutdown();

        // drive() on an already-progressed task is a no-op once shutdown has
        // been requested; it must not panic or dispatch another role.
        supervisor.drive(&task_id).await.unwrap();
        let after = supervisor.registry().await.get(&task_id).await.unwrap();
        assert_eq!(before.task.status, after.task.status);
    }

    #[tokio::test]
    async fn multi_reviewer_consensus_eventually_blocks_a_task_the_reviewer_keeps_rejecting() {
        // The echo adapter reflects the Reviewer prompt verbatim. The prompt's
        // own output-format instructions contain the word "Reject" in prose
        // but no line starting with `ACTION:`, so every vote in every round
        // falls back to the rejection-keyword scan and comes back rejected -
        // a deterministic way to exercise the full fan-out-then-resolve path
        // without depending on a real reviewer's judgment.
        let mut config = config_with_echo_adapter();
        config.review_consensus_count = 3;
        config.max_retries_per_task = 1;
        let supervisor = build_supervisor_with_config(config);

        let task_id = supervisor
            .submit_task("ship the feature", "because users are waiting, verify the result")
            .await
            .unwrap();

        let snapshot = supervisor.registry().await.get(&task_id).await.unwrap();
        assert_eq!(snapshot.task.status, TaskStatus::Blocked);
    }
}
