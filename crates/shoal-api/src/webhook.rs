use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use shoal_domain::{JobEvent, LogLevel, WebhookDelivery, WebhookStatus};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use shoal_worker::WebhookOutcome;

const SECRET_HEADER: &str = "x-webhook-secret";

pub fn router() -> Router<AppState> {
    Router::new().route("/status-webhook/:serial", post(receive_webhook))
}

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    pub status: WebhookStatus,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub delivery_id: Option<Uuid>,
}

/// `POST /api/v1/status-webhook/<serial>` (spec.md §4.8). Always 200 unless
/// the shared secret is missing or wrong — never discloses whether the
/// serial has an active job.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    headers: HeaderMap,
    Json(body): Json<WebhookBody>,
) -> Response {
    if !secret_matches(&headers, &state.webhook_secret) {
        return ApiError::Unauthorized.into_response();
    }

    match handle_webhook(&state, &serial, body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

fn secret_matches(headers: &HeaderMap, expected: &str) -> bool {
    let Some(provided) = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    // Constant-time comparison so a timing side-channel can't leak the
    // secret one byte at a time.
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

async fn handle_webhook(state: &AppState, serial: &str, body: WebhookBody) -> Result<(), ApiError> {
    let Some(job) = state.store.get_active_job_for_serial(serial).await? else {
        tracing::warn!(serial, "status webhook for serial with no active job; recording as orphan");
        return Ok(());
    };

    let delivery_id = body
        .delivery_id
        .map(shoal_domain::DeliveryId)
        .unwrap_or_else(|| WebhookDelivery::derive_id(job.id, body.status, body.failed_step.as_deref()));

    let delivery = WebhookDelivery {
        job_id: job.id,
        status: body.status,
        failed_step: body.failed_step.clone(),
        delivery_id,
    };
    let first_time = state.store.record_webhook_delivery(&delivery).await?;
    if !first_time {
        return Ok(());
    }

    let message = match body.status {
        WebhookStatus::Success => "Webhook reported success",
        WebhookStatus::Failed => "Webhook reported failure",
    };
    let mut event = JobEvent::new(job.id, LogLevel::Info, message);
    if let Some(step) = &body.failed_step {
        event = event.with_step(step.clone());
    }
    state.store.append_event(event).await?;

    state.worker.notify_webhook(job.id, WebhookOutcome { status: body.status, failed_step: body.failed_step });
    Ok(())
}
