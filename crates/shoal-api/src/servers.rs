use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use shoal_domain::Server;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/servers/:serial", put(upsert_server).get(get_server))
}

#[derive(Debug, Deserialize)]
pub struct UpsertServerRequest {
    pub bmc_endpoint: String,
    pub bmc_user: String,
    pub bmc_password: String,
    #[serde(default = "default_vendor_tag")]
    pub vendor_tag: String,
}

fn default_vendor_tag() -> String {
    "generic".to_string()
}

/// `PUT /api/v1/servers/<serial>` — the minimal admin API the data model
/// names ("Created/updated by admin API"); the HTML admin UI and its
/// RBAC subsystem are out of core scope, this JSON upsert is not.
pub async fn upsert_server(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Json(req): Json<UpsertServerRequest>,
) -> Response {
    let server = Server {
        serial,
        bmc_endpoint: req.bmc_endpoint,
        bmc_user: req.bmc_user,
        bmc_password: req.bmc_password,
        vendor_tag: req.vendor_tag,
        last_seen: Utc::now(),
    };
    if let Err(e) = server.validate() {
        return ApiError::InvalidInput(e).into_response();
    }
    match state.store.upsert_server(&server).await {
        Ok(()) => Json(redact(&server)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn get_server(State(state): State<AppState>, Path(serial): Path<String>) -> Response {
    match state.store.get_server(&serial).await {
        Ok(Some(server)) => Json(redact(&server)).into_response(),
        Ok(None) => ApiError::ServerNotFound(serial).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(serde::Serialize)]
struct ServerView {
    serial: String,
    bmc_endpoint: String,
    bmc_user: String,
    vendor_tag: String,
    last_seen: chrono::DateTime<chrono::Utc>,
}

/// Never echoes `bmc_password` back to a client (spec.md §3: "never logged,
/// never echoed").
fn redact(server: &Server) -> ServerView {
    ServerView {
        serial: server.serial.clone(),
        bmc_endpoint: server.bmc_endpoint.clone(),
        bmc_user: server.bmc_user.clone(),
        vendor_tag: server.vendor_tag.clone(),
        last_seen: server.last_seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use shoal_config::RecipeValidator;
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

    #[tokio::test]
    async fn upsert_then_get_round_trips_without_leaking_password() {
        let app = router().with_state(test_state());
        let body = serde_json::json!({
            "bmc_endpoint": "https://bmc.example/",
            "bmc_user": "admin",
            "bmc_password": "hunter2",
        });
        let put_resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/servers/SER1")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put_resp.status(), StatusCode::OK);
        let bytes = to_bytes(put_resp.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("hunter2"));

        let get_resp = app
            .oneshot(Request::builder().uri("/servers/SER1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get_resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upsert_rejects_invalid_bmc_endpoint() {
        let app = router().with_state(test_state());
        let body = serde_json::json!({
            "bmc_endpoint": "not-a-url",
            "bmc_user": "admin",
            "bmc_password": "pw",
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/servers/SER1")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_unknown_server_is_404() {
        let app = router().with_state(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/servers/GHOST").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
