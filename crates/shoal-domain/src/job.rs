use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::ids::{DeliveryId, JobId};
use crate::recipe::Recipe;

/// Lifecycle state of a [`Job`].
///
/// Transitions: `Queued -> Provisioning -> (Succeeded | Failed) -> Complete`.
/// Only the worker holding the job's lease may move it past `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Provisioning,
    Succeeded,
    Failed,
    Complete,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Provisioning => "provisioning",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl JobStatus {
    /// Whether `self -> next` is a legal transition per spec.md §4.4.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Provisioning)
                | (Provisioning, Succeeded)
                | (Provisioning, Failed)
                | (Succeeded, Complete)
                | (Failed, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete)
    }
}

/// A provisioning job: the unit of work the worker pool claims, drives
/// through Redfish, and resolves via the out-of-band status webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub server_serial: String,
    pub status: JobStatus,
    pub recipe: Recipe,
    pub failed_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub picked_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub task_iso_path: Option<String>,
    pub maintenance_iso_url: String,
}

impl Job {
    pub fn new_queued(server_serial: String, recipe: Recipe, maintenance_iso_url: String) -> Self {
        let now = Utc::now();
        Job {
            id: JobId::new(),
            server_serial,
            status: JobStatus::Queued,
            recipe,
            failed_step: None,
            created_at: now,
            updated_at: now,
            picked_at: None,
            worker_id: None,
            lease_expires_at: None,
            task_iso_path: None,
            maintenance_iso_url,
        }
    }

    /// Applies a status transition, enforcing the state machine invariant.
    /// Callers (the store's conditional update, or in-memory test doubles)
    /// are responsible for the actual persistence/atomicity.
    pub fn transition(&mut self, next: JobStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// An append-only log entry attached to a job. Ordering per job is by
/// `(time, id)` — `id` is assigned monotonically by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: JobId,
    pub time: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub step: Option<String>,
}

impl JobEvent {
    /// Builds an event with `id` left at 0 — the store assigns the real
    /// monotonic id on append.
    pub fn new(job_id: JobId, level: LogLevel, message: impl Into<String>) -> Self {
        JobEvent {
            id: 0,
            job_id,
            time: Utc::now(),
            level,
            message: message.into(),
            step: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Success,
    Failed,
}

/// Idempotency record for a single status-webhook report. `delivery_id` is
/// stable per `(job, status, failed_step)` tuple so a retried webhook POST
/// reuses the same id and is applied at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub job_id: JobId,
    pub status: WebhookStatus,
    pub failed_step: Option<String>,
    pub delivery_id: DeliveryId,
}

/// Namespace used to derive a deterministic v5 UUID when the webhook body
/// doesn't supply its own `delivery_id`.
const DELIVERY_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x4f, 0x1b, 0x2a, 0x2f, 0x51, 0x4b, 0x9e, 0x9a, 0x1d, 0x6c, 0x0a, 0x0c, 0x1e, 0x3d, 0x7f,
]);

impl WebhookDelivery {
    /// Derives a stable delivery id from `(job_id, status, failed_step)` so
    /// retrying the same report reuses the same id and is deduplicated.
    pub fn derive_id(job_id: JobId, status: WebhookStatus, failed_step: Option<&str>) -> DeliveryId {
        let key = format!(
            "{}:{}:{}",
            job_id,
            match status {
                WebhookStatus::Success => "success",
                WebhookStatus::Failed => "failed",
            },
            failed_step.unwrap_or(""),
        );
        DeliveryId(Uuid::new_v5(&DELIVERY_ID_NAMESPACE, key.as_bytes()))
    }
}
