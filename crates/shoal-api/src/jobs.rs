use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use shoal_domain::{Job, JobEvent, JobId, JobStatus, LogLevel, Recipe};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(get_job))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub server_serial: String,
    pub recipe: serde_json::Value,
    /// URL of the maintenance ISO the worker boots the target into to pick
    /// up the task ISO; defaults to the worker's configured media base.
    #[serde(default)]
    pub maintenance_iso_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub server_serial: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `POST /api/v1/jobs` (spec.md §4.9/§6): validates the recipe against the
/// embedded schema, checks the server exists, and enqueues a queued job.
pub async fn create_job(State(state): State<AppState>, Json(req): Json<CreateJobRequest>) -> Response {
    match do_create_job(&state, req).await {
        Ok(resp) => (axum::http::StatusCode::ACCEPTED, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn do_create_job(state: &AppState, req: CreateJobRequest) -> Result<CreateJobResponse, ApiError> {
    if state.store.get_server(&req.server_serial).await?.is_none() {
        return Err(ApiError::ServerNotFound(req.server_serial));
    }

    state
        .recipe_validator
        .validate(&req.recipe)
        .map_err(ApiError::InvalidInput)?;
    let recipe: Recipe = serde_json::from_value(req.recipe)
        .map_err(|e| ApiError::InvalidInput(format!("recipe does not match the expected shape: {e}")))?;
    recipe.validate().map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let maintenance_iso_url = req
        .maintenance_iso_url
        .unwrap_or_else(|| format!("{}/maintenance.iso", state.task_root.display()));
    let job = Job::new_queued(req.server_serial.clone(), recipe, maintenance_iso_url);
    state.store.create_job(&job).await?;
    state.store.append_event(JobEvent::new(job.id, LogLevel::Info, "Job queued")).await?;

    Ok(CreateJobResponse {
        job_id: job.id.as_uuid(),
        status: job.status,
        server_serial: job.server_serial,
        created_at: job.created_at,
    })
}

#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub events: Vec<JobEvent>,
}

/// `GET /api/v1/jobs/<id>` — the job row plus its event log.
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match do_get_job(&state, JobId(id)).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn do_get_job(state: &AppState, id: JobId) -> Result<JobView, ApiError> {
    let job = state.store.get_job(id).await?.ok_or_else(|| ApiError::JobNotFound(id.to_string()))?;
    let events = state.store.list_events(id).await?;
    Ok(JobView { job, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shoal_config::RecipeValidator;
    use shoal_domain::Server;
    use shoal_redfish::client::testing::MockRedfishClientFactory;
    use shoal_store::InMemoryStore;
    use shoal_worker::{GenIsoImageBuilder, WorkerLoop};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let store: Arc<dyn shoal_store::StateStore> = Arc::new(InMemoryStore::new());
        let worker = Arc::new(WorkerLoop::new(
            store.clone(),
            Arc::new(MockRedfishClientFactory::default()),
            Arc::new(GenIsoImageBuilder),
            shoal_config::WorkerConfig {
                worker_id: "w1".into(),
                poll_interval: std::time::Duration::from_millis(10),
                lease_ttl: std::time::Duration::from_secs(60),
                extend_lease_every: std::time::Duration::from_secs(20),
                stuck_job_timeout: std::time::Duration::from_secs(60),
                redfish_timeout: std::time::Duration::from_secs(5),
                task_iso_media_base_url: "http://localhost/media/tasks".into(),
            },
            std::env::temp_dir(),
        ));
        AppState {
            store,
            worker,
            recipe_validator: Arc::new(RecipeValidator::new().unwrap()),
            webhook_secret: "s3cr3t".into(),
            task_root: std::env::temp_dir(),
        }
    }

    async fn seed_server(state: &AppState, serial: &str) {
        state
            .store
            .upsert_server(&Server {
                serial: serial.to_string(),
                bmc_endpoint: "https://bmc.example/".to_string(),
                bmc_user: "admin".to_string(),
                bmc_password: "pw".to_string(),
                vendor_tag: "generic".to_string(),
                last_seen: chrono::Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_job_returns_202_for_known_server() {
        let state = test_state();
        seed_server(&state, "SER1").await;
        let app = router().with_state(state);

        let body = serde_json::json!({
            "server_serial": "SER1",
            "recipe": {"task_target": "install-linux.target", "target_disk": "/dev/sda"},
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn create_job_records_job_queued_event() {
        let state = test_state();
        seed_server(&state, "SER1").await;
        let store = state.store.clone();
        let app = router().with_state(state);

        let body = serde_json::json!({
            "server_serial": "SER1",
            "recipe": {"task_target": "install-linux.target", "target_disk": "/dev/sda"},
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let created: CreateJobResponse = serde_json::from_slice(&bytes).unwrap();
        let events = store.list_events(JobId(created.job_id)).await.unwrap();
        assert!(events.iter().any(|e| e.message == "Job queued"));
    }

    #[tokio::test]
    async fn create_job_returns_404_for_unknown_server() {
        let state = test_state();
        let app = router().with_state(state);

        let body = serde_json::json!({
            "server_serial": "GHOST",
            "recipe": {"task_target": "install-linux.target", "target_disk": "/dev/sda"},
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_job_returns_400_for_invalid_recipe() {
        let state = test_state();
        seed_server(&state, "SER1").await;
        let app = router().with_state(state);

        let body = serde_json::json!({
            "server_serial": "SER1",
            "recipe": {"task_target": "install-linux.target"},
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_job_returns_job_and_events() {
        let state = test_state();
        seed_server(&state, "SER1").await;
        let job = Job::new_queued("SER1".to_string(), shoal_domain::Recipe::minimal("t", "/dev/sda"), "http://x/m.iso".to_string());
        state.store.create_job(&job).await.unwrap();
        let app = router().with_state(state);

        let resp = app
            .oneshot(Request::builder().uri(format!("/jobs/{}", job.id.as_uuid())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_job_returns_404_for_unknown_id() {
        let state = test_state();
        let app = router().with_state(state);

        let resp = app
            .oneshot(Request::builder().uri(format!("/jobs/{}", Uuid::new_v4())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
