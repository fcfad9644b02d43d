use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/tasks/:job_id/task.iso", get(get_task_iso))
}

/// `GET /media/tasks/<job_id>/task.iso` — serves the built task ISO bytes
/// to the target BMC's virtual media mount (spec.md §6). 404 if the job or
/// its ISO file doesn't exist yet.
pub async fn get_task_iso(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    let path = state.task_root.join(job_id.to_string()).join("task.iso");
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([("content-type", "application/octet-stream")], Body::from(bytes)).into_response(),
        Err(_) => ApiError::JobNotFound(job_id.to_string()).into_response(),
    }
}
