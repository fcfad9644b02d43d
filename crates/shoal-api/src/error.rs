use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Controller API error kinds (spec.md §7). Every variant maps to a status
/// code and a `{"error": "..."}` body — the job controller's own shape,
/// distinct from the registry's OCI `{"errors":[...]}` contract since the
/// two surfaces speak different client protocols.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("server unknown: {0}")]
    ServerNotFound(String),

    #[error("job unknown: {0}")]
    JobNotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("store error: {0}")]
    Store(#[from] shoal_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::ServerNotFound(_) | ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Unauthorized => "authentication required".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}
