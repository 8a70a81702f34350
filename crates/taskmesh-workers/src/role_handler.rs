use async_trait::async_trait;
use chrono::Utc;
use tracing::Level;

use taskmesh_core::{AdapterExecutor, CoreError, QualityEvaluator};
use taskmesh_observability::{emit_event, ObservabilityEvent, ProcessKind};
use taskmesh_types::adapter::AdapterConfig;
use taskmesh_types::messages::{Role, RoleMessage};

use crate::prompts::RolePrompts;

/// A role's dispatchable unit of work, pulled out of `RoleMessage::ExecuteRole`
/// so a handler doesn't need to match the whole enum just to read its fields.
pub struct RoleRequest {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub plan_output: Option<String>,
    pub build_output: Option<String>,
    pub preferred_adapter: Option<String>,
    pub skip_adapter: Option<String>,
}

/// Executes one role's prompt against the adapter fallback chain and turns
/// the result into the outcome message the Coordinator expects.
/// Implemented per role rather than via inheritance: each
/// role only differs in prompt shape and quality threshold.
#[async_trait]
pub trait RoleHandler: Send + Sync {
    fn role(&self) -> Role;
    async fn execute(&self, request: RoleRequest) -> RoleMessage;
}

struct RoleRuntime {
    executor: AdapterExecutor,
    adapters: Vec<AdapterConfig>,
    timeout_seconds: u64,
    quality_concern_threshold: f64,
}

impl RoleRuntime {
    fn ordered_adapters(&self, preferred: Option<&str>) -> Vec<AdapterConfig> {
        match preferred {
            None => self.adapters.clone(),
            Some(id) => {
                let mut ordered: Vec<AdapterConfig> =
                    self.adapters.iter().filter(|a| a.id == id).cloned().collect();
                ordered.extend(self.adapters.iter().filter(|a| a.id != id).cloned());
                ordered
            }
        }
    }

    async fn run(
        &self,
        role: Role,
        task_id: &str,
        prompt: &str,
        skip_adapter: Option<&str>,
        preferred_adapter: Option<&str>,
    ) -> RoleMessage {
        let order = self.ordered_adapters(preferred_adapter);
        let role_label = role.as_str();

        emit_event(
            Level::INFO,
            ProcessKind::Worker,
            ObservabilityEvent {
                event: "role.dispatched",
                component: "role_handler",
                correlation_id: None,
                task_id: Some(task_id),
                role: Some(role_label),
                adapter_id: None,
                status: None,
                error_code: None,
                detail: None,
            },
        );

        match self
            .executor
            .execute(&order, prompt, self.timeout_seconds, skip_adapter)
            .await
        {
            Ok(output) => {
                let prior = order
                    .iter()
                    .find(|a| a.id == output.adapter_id)
                    .map(|a| a.reliability_prior())
                    .unwrap_or(0.5);
                let confidence = QualityEvaluator::confidence(&output.stdout, prior);

                if confidence < self.quality_concern_threshold {
                    emit_event(
                        Level::WARN,
                        ProcessKind::Worker,
                        ObservabilityEvent {
                            event: "role.quality_concern",
                            component: "role_handler",
                            correlation_id: None,
                            task_id: Some(task_id),
                            role: Some(role_label),
                            adapter_id: Some(&output.adapter_id),
                            status: Some("concern"),
                            error_code: None,
                            detail: None,
                        },
                    );
                    RoleMessage::QualityConcern {
                        task_id: task_id.to_string(),
                        role,
                        confidence,
                        concern: format!(
                            "output from '{}' scored {:.2}, below the quality threshold of {:.2}",
                            output.adapter_id, confidence, self.quality_concern_threshold
                        ),
                        adapter_id: output.adapter_id,
                    }
                } else {
                    emit_event(
                        Level::INFO,
                        ProcessKind::Worker,
                        ObservabilityEvent {
                            event: "role.succeeded",
                            component: "role_handler",
                            correlation_id: None,
                            task_id: Some(task_id),
                            role: Some(role_label),
                            adapter_id: Some(&output.adapter_id),
                            status: Some("succeeded"),
                            error_code: None,
                            detail: None,
                        },
                    );
                    RoleMessage::RoleSucceeded {
                        task_id: task_id.to_string(),
                        role,
                        output: output.stdout,
                        confidence,
                        adapter_id: output.adapter_id,
                        completed_at: Utc::now(),
                    }
                }
            }
            Err(err) => {
                let retriable = is_retriable(&err);
                let adapter_id = err.adapter_id().map(|s| s.to_string());
                emit_event(
                    Level::ERROR,
                    ProcessKind::Worker,
                    ObservabilityEvent {
                        event: "role.failed",
                        component: "role_handler",
                        correlation_id: None,
                        task_id: Some(task_id),
                        role: Some(role_label),
                        adapter_id: adapter_id.as_deref(),
                        status: Some(if retriable { "retriable" } else { "permanent" }),
                        error_code: None,
                        detail: Some(&err.to_string()),
                    },
                );
                RoleMessage::RoleFailed {
                    task_id: task_id.to_string(),
                    role,
                    retriable,
                    error: err.to_string(),
                    adapter_id,
                    failed_at: Utc::now(),
                }
            }
        }
    }
}

fn is_retriable(err: &CoreError) -> bool {
    !matches!(err, CoreError::AdaptersExhausted { .. })
}

pub struct PlannerHandler(RoleRuntime);
pub struct BuilderHandler(RoleRuntime);
pub struct ReviewerHandler(RoleRuntime);

impl PlannerHandler {
    pub fn new(
        executor: AdapterExecutor,
        adapters: Vec<AdapterConfig>,
        timeout_seconds: u64,
        quality_concern_threshold: f64,
    ) -> Self {
        Self(RoleRuntime {
            executor,
            adapters,
            timeout_seconds,
            quality_concern_threshold,
        })
    }
}

impl BuilderHandler {
    pub fn new(
        executor: AdapterExecutor,
        adapters: Vec<AdapterConfig>,
        timeout_seconds: u64,
        quality_concern_threshold: f64,
    ) -> Self {
        Self(RoleRuntime {
            executor,
            adapters,
            timeout_seconds,
            quality_concern_threshold,
        })
    }
}

impl ReviewerHandler {
    pub fn new(
        executor: AdapterExecutor,
        adapters: Vec<AdapterConfig>,
        timeout_seconds: u64,
        quality_concern_threshold: f64,
    ) -> Self {
        Self(RoleRuntime {
            executor,
            adapters,
            timeout_seconds,
            quality_concern_threshold,
        })
    }
}

#[async_trait]
impl RoleHandler for PlannerHandler {
    fn role(&self) -> Role {
        Role::Planner
    }

    async fn execute(&self, request: RoleRequest) -> RoleMessage {
        let prompt = RolePrompts::planner(&request.title, &request.description);
        self.0
            .run(
                Role::Planner,
                &request.task_id,
                &prompt,
                request.skip_adapter.as_deref(),
                request.preferred_adapter.as_deref(),
            )
            .await
    }
}

#[async_trait]
impl RoleHandler for BuilderHandler {
    fn role(&self) -> Role {
        Role::Builder
    }

    async fn execute(&self, request: RoleRequest) -> RoleMessage {
        let prompt = RolePrompts::builder(
            &request.title,
            &request.description,
            request.plan_output.as_deref(),
            None,
        );
        self.0
            .run(
                Role::Builder,
                &request.task_id,
                &prompt,
                request.skip_adapter.as_deref(),
                request.preferred_adapter.as_deref(),
            )
            .await
    }
}

#[async_trait]
impl RoleHandler for ReviewerHandler {
    fn role(&self) -> Role {
        Role::Reviewer
    }

    async fn execute(&self, request: RoleRequest) -> RoleMessage {
        let build_output = request.build_output.clone().unwrap_or_default();
        let prompt = RolePrompts::reviewer(&request.title, &request.description, &build_output);
        self.0
            .run(
                Role::Reviewer,
                &request.task_id,
                &prompt,
                request.skip_adapter.as_deref(),
                request.preferred_adapter.as_deref(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use taskmesh_core::CircuitBreakers;
    use taskmesh_types::adapter::SandboxKind;

    fn cat_adapter(id: &str) -> AdapterConfig {
        AdapterConfig {
            id: id.to_string(),
            command: "cat".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            sandbox: SandboxKind::Host,
            reliability_prior: 0.8,
        }
    }

    #[tokio::test]
    async fn planner_succeeds_against_echoing_adapter() {
        let executor = AdapterExecutor::new(CircuitBreakers::new(3, 60));
        let handler = PlannerHandler::new(executor, vec![cat_adapter("a1")], 5, 0.0);

        let request = RoleRequest {
            task_id: "t1".to_string(),
            title: "implement step test".to_string(),
            description: "because it verifies the result".to_string(),
            plan_output: None,
            build_output: None,
            preferred_adapter: None,
            skip_adapter: None,
        };

        match handler.execute(request).await {
            RoleMessage::RoleSucceeded { adapter_id, .. } => assert_eq!(adapter_id, "a1"),
            other => panic!("expected RoleSucceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn role_failed_when_every_adapter_exhausted() {
        let executor = AdapterExecutor::new(CircuitBreakers::new(3, 60));
        let handler = BuilderHandler::new(executor, vec![], 5, 0.0);

        let request = RoleRequest {
            task_id: "t1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            plan_output: None,
            build_output: None,
            preferred_adapter: None,
            skip_adapter: None,
        };

        match handler.execute(request).await {
            RoleMessage::RoleFailed { retriable, .. } => assert!(!retriable),
            other => panic!("expected RoleFailed, got {other:?}"),
        }
    }
}
