mod auth;
mod handlers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use shoal_redfish::CorrelationLayer;
use tower_http::trace::TraceLayer;

use crate::state::RegistryState;

/// Builds the full Distribution v2 router: ping, blobs, uploads, manifests,
/// plus `/metrics`. Auth and audit/request-counting apply to every `/v2/*`
/// route; `/metrics` is intentionally left unauthenticated for scraping.
pub fn build_router(state: RegistryState) -> Router {
    let v2 = Router::new()
        .route("/", get(handlers::ping))
        .route(
            "/:name/blobs/:digest",
            get(handlers::get_blob).head(handlers::head_blob),
        )
        .route("/:name/blobs/uploads/", post(handlers::start_upload))
        .route(
            "/:name/blobs/uploads/:session",
            get(handlers::get_upload_status)
                .patch(handlers::patch_upload)
                .put(handlers::put_upload)
                .delete(handlers::delete_upload),
        )
        .route(
            "/:name/manifests/:reference",
            get(handlers::get_manifest)
                .head(handlers::head_manifest)
                .put(handlers::put_manifest)
                .delete(handlers::delete_manifest),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_basic_auth))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::audit_and_count));

    Router::new()
        .nest("/v2", v2)
        .route("/metrics", get(handlers::metrics))
        .layer(CorrelationLayer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shoal_config::RegistryConfig;
    use tower::util::ServiceExt;

    fn test_state() -> RegistryState {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RegistryConfig {
            enabled: true,
            storage_root: dir.path().to_string_lossy().into_owned(),
            auth_mode: shoal_config::RegistryAuthMode::None,
            htpasswd_file: None,
            gc_interval: std::time::Duration::from_secs(3600),
            gc_grace_period: std::time::Duration::from_secs(3600 * 24),
            max_concurrent_uploads: 16,
            upload_timeout: std::time::Duration::from_secs(300),
            download_timeout: std::time::Duration::from_secs(300),
            enable_audit_log: false,
            audit_log_path: None,
            basic_user: None,
            basic_password: None,
        };
        // Leak the tempdir so it outlives the returned state in these tests.
        std::mem::forget(dir);
        RegistryState::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn ping_returns_200_with_version_header() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/v2/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Docker-Distribution-API-Version").unwrap(),
            "registry/2.0"
        );
    }

    #[tokio::test]
    async fn missing_blob_returns_404() {
        let app = build_router(test_state());
        let digest = "sha256:".to_string() + &"0".repeat(64);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/test/blobs/{digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_endpoint_is_unauthenticated_and_returns_text() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn finalising_an_upload_without_digest_is_rejected() {
        let app = build_router(test_state());
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v2/test/blobs/uploads/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let location = resp.headers().get("location").unwrap().to_str().unwrap().to_string();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(location)
                    .body(Body::from(&b"hi"[..]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_a_manifest_by_digest_is_unsupported() {
        let app = build_router(test_state());
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v2/test/manifests/latest")
                    .body(Body::from(&br#"{"schemaVersion":2}"#[..]))
                    .unwrap(),
            )
            .await
            .unwrap();
        let digest = resp.headers().get("Docker-Content-Digest").unwrap().to_str().unwrap().to_string();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v2/test/manifests/{digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
