use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use taskmesh_coordinator::Supervisor;
use taskmesh_core::EventBus;
use taskmesh_types::messages::ConsensusVote;

use crate::error::{IngressError, IngressResult};
use crate::memory::MemoryWriter;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub events: EventBus,
    pub memory: MemoryWriter,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tasks", get(list_tasks).post(submit_task))
        .route("/tasks/{task_id}", get(get_task))
        .route("/actions", post(post_action))
        .route("/events", get(sse_events))
        .route("/events/recent", get(recent_events))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    title: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct SubmitTaskResponse {
    #[serde(rename = "taskId")]
    task_id: String,
}

/// `POST submit(title, description)` — allocates a task id regardless of
/// current load and returns it; the `task.submitted` event is emitted by the
/// Coordinator itself on construction, not by this handler.
async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitTaskRequest>,
) -> IngressResult<Json<SubmitTaskResponse>> {
    if request.title.trim().is_empty() {
        return Err(IngressError::BadRequest("title must not be empty".to_string()));
    }

    let task_id = state
        .supervisor
        .submit_task(request.title, request.description)
        .await?;
    tracing::info!(task_id = %task_id, "task submitted");

    Ok(Json(SubmitTaskResponse { task_id }))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Value> {
    let snapshots = state.supervisor.registry().await.list().await;
    Json(serde_json::to_value(snapshots).unwrap_or(Value::Null))
}

async fn get_task(State(state): State<AppState>, Path(task_id): Path<String>) -> IngressResult<Json<Value>> {
    let snapshot = state
        .supervisor
        .registry()
        .await
        .get(&task_id)
        .await
        .ok_or_else(|| IngressError::TaskNotFound(task_id.clone()))?;

    Ok(Json(serde_json::to_value(snapshot).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "actionId", rename_all = "snake_case")]
enum ActionRequest {
    ApproveReview { task_id: String },
    RejectReview { task_id: String, reason: String },
    RequestRework { task_id: String },
    PauseTask { task_id: String },
    ResumeTask { task_id: String },
    SetSubtaskDepth { task_id: String, max_depth: u32 },
    SubmitConsensusVote {
        round_id: String,
        voter_id: String,
        approved: bool,
        confidence: f64,
        #[serde(default)]
        feedback: Option<String>,
    },
}

/// `POST action(actionId, taskId?, payload)` — every accepted action is
/// echoed as an `action.received` event before the Supervisor acts on it, so
/// a client watching the event stream sees its own request land.
async fn post_action(
    State(state): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> IngressResult<Json<Value>> {
    state
        .events
        .publish(
            taskmesh_types::event::event_types::ACTION_RECEIVED,
            action_task_id(&request),
            json!({ "action": action_label(&request) }),
        )
        .await;
    tracing::debug!(action = action_label(&request), "action accepted");

    match request {
        ActionRequest::ApproveReview { task_id } => {
            state.supervisor.approve_review(&task_id).await?;
            state.supervisor.drive(&task_id).await?;
        }
        ActionRequest::RejectReview { task_id, reason } => {
            state.supervisor.reject_review(&task_id, reason).await?;
            state.supervisor.drive(&task_id).await?;
        }
        ActionRequest::RequestRework { task_id } => {
            state.supervisor.request_rework(&task_id).await?;
            state.supervisor.drive(&task_id).await?;
        }
        ActionRequest::PauseTask { task_id } => {
            state.supervisor.pause_task(&task_id).await?;
        }
        ActionRequest::ResumeTask { task_id } => {
            state.supervisor.resume_task(&task_id).await?;
        }
        ActionRequest::SetSubtaskDepth { task_id, max_depth } => {
            state.supervisor.set_subtask_depth(&task_id, max_depth).await?;
        }
        ActionRequest::SubmitConsensusVote {
            round_id,
            voter_id,
            approved,
            confidence,
            feedback,
        } => {
            let vote = ConsensusVote::new(voter_id, approved, confidence, feedback);
            state.supervisor.record_consensus_vote(&round_id, vote).await?;
        }
    }

    Ok(Json(json!({ "accepted": true })))
}

fn action_task_id(request: &ActionRequest) -> Option<String> {
    match request {
        ActionRequest::ApproveReview { task_id }
        | ActionRequest::RejectReview { task_id, .. }
        | ActionRequest::RequestRework { task_id }
        | ActionRequest::PauseTask { task_id }
        | ActionRequest::ResumeTask { task_id }
        | ActionRequest::SetSubtaskDepth { task_id, .. } => Some(task_id.clone()),
        ActionRequest::SubmitConsensusVote { .. } => None,
    }
}

fn action_label(request: &ActionRequest) -> &'static str {
    match request {
        ActionRequest::ApproveReview { .. } => "approve_review",
        ActionRequest::RejectReview { .. } => "reject_review",
        ActionRequest::RequestRework { .. } => "request_rework",
        ActionRequest::PauseTask { .. } => "pause_task",
        ActionRequest::ResumeTask { .. } => "resume_task",
        ActionRequest::SetSubtaskDepth { .. } => "set_subtask_depth",
        ActionRequest::SubmitConsensusVote { .. } => "submit_consensus_vote",
    }
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_count")]
    count: usize,
}

fn default_recent_count() -> usize {
    200
}

async fn recent_events(State(state): State<AppState>, Query(query): Query<RecentQuery>) -> Json<Value> {
    let capped = query.count.min(200);
    let events = state.events.recent(capped).await;
    Json(json!(events.into_iter().map(|e| e.envelope).collect::<Vec<_>>()))
}

/// `GET events` — replays the current ring buffer and then tails live
/// publications, matching the reference implementation's connect-then-tail
/// stream behavior rather than starting a subscriber blind.
async fn sse_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let backlog = state.events.recent(200).await;
    let rx = state.events.subscribe();

    let replay = futures::stream::iter(backlog.into_iter().map(|sequenced| to_sse_event(&sequenced.envelope)));
    let live = BroadcastStream::new(rx).filter_map(|msg| msg.ok().map(|sequenced| to_sse_event(&sequenced.envelope)));

    Sse::new(replay.chain(live)).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)))
}

fn to_sse_event(envelope: &taskmesh_types::event::EventEnvelope) -> Result<Event, Infallible> {
    Ok(Event::default()
        .event(envelope.event_type.clone())
        .json_data(envelope)
        .unwrap_or_else(|_| Event::default().data("{}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::Blackboard;
    use taskmesh_coordinator::TaskRegistry;
    use taskmesh_types::config::RuntimeConfig;
    use tower::ServiceExt;

    async fn build_state() -> AppState {
        let events = EventBus::new(200);
        let registry = TaskRegistry::new(events.clone());
        let blackboard = Blackboard::new(events.clone());
        let supervisor = Arc::new(Supervisor::new(RuntimeConfig::default(), events.clone(), registry, blackboard));
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryWriter::new(dir.path()).await.unwrap();
        AppState { supervisor, events, memory }
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = router(build_state().await);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_task_returns_404() {
        let app = router(build_state().await);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tasks/does-not-exist")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
