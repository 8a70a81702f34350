use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use taskmesh_coordinator::CoordinatorError;

pub type IngressResult<T> = Result<T, IngressError>;

/// Ingress-facing error type. Every variant maps to one HTTP status so a
/// handler never has to reason about status codes itself.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("persistence error: {source}")]
    Persistence { source: std::io::Error },

    #[error("serialization error: {source}")]
    Serialization { source: serde_json::Error },
}

impl IngressError {
    fn status(&self) -> StatusCode {
        match self {
            IngressError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            IngressError::BadRequest(_) => StatusCode::BAD_REQUEST,
            IngressError::Coordinator(CoordinatorError::CoordinatorNotFound(_))
            | IngressError::Coordinator(CoordinatorError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
            IngressError::Coordinator(CoordinatorError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            IngressError::Coordinator(CoordinatorError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            IngressError::Coordinator(_) => StatusCode::SERVICE_UNAVAILABLE,
            IngressError::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
            IngressError::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
