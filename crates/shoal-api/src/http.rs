use axum::Router;
use shoal_redfish::CorrelationLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{jobs, media, servers, webhook};

/// Builds the controller's full HTTP surface: the job admission API, the
/// webhook endpoint, and task-ISO media serving, all under `/api/v1` and
/// `/media` respectively. The OCI registry surface (`/v2`) is mounted
/// separately by the caller via [`shoal_registry::build_router`], since it
/// carries its own `RegistryState` rather than [`AppState`] (spec.md §6:
/// "`/v2/...` — OCI Distribution v2 surface as in §4.4").
pub fn build_router(state: AppState) -> Router {
    let api = Router::new().merge(jobs::router()).merge(webhook::router()).merge(servers::router());

    Router::new()
        .nest("/api/v1", api)
        .nest("/media", media::router())
        .layer(CorrelationLayer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
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
    async fn unknown_route_is_404() {
        let app = build_router(test_state());
        let resp = app.oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn jobs_route_is_mounted_under_api_v1() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri(format!("/api/v1/jobs/{}", uuid::Uuid::new_v4())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
