use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoal_domain::{DeliveryId, Job, JobEvent, JobId, JobStatus, Server, WebhookDelivery};

use crate::error::StoreError;

/// Persistence surface shared by the controller, worker, and webhook
/// handler. The job-claim method is the system's single coordination
/// point (spec.md §9 Open Question (a)): a conditional `UPDATE ...
/// RETURNING` does the work a separate lease table would otherwise need.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get_server(&self, serial: &str) -> Result<Option<Server>, StoreError>;
    async fn upsert_server(&self, server: &Server) -> Result<(), StoreError>;

    async fn create_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// The most recently created non-terminal job for `serial`, if any —
    /// the webhook handler's "current active job" lookup (spec.md §4.8
    /// step 2).
    async fn get_active_job_for_serial(&self, serial: &str) -> Result<Option<Job>, StoreError>;

    /// Atomically claims one queued job whose lease is NULL or expired,
    /// setting `status=provisioning`, `worker_id`, `picked_at=now`,
    /// `lease_expires_at=now+lease_ttl`. Returns `None` if no job won the
    /// race — the caller simply polls again.
    async fn claim_next_job(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_ttl: chrono::Duration,
    ) -> Result<Option<Job>, StoreError>;

    /// Extends the lease on a job this worker still holds. Returns `false`
    /// (not an error) if the lease was lost to another worker or the job
    /// left `provisioning` in the meantime.
    async fn extend_lease(
        &self,
        job_id: JobId,
        worker_id: &str,
        new_lease_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_task_iso_path(&self, job_id: JobId, path: &str) -> Result<(), StoreError>;

    async fn transition_job(
        &self,
        job_id: JobId,
        next: JobStatus,
        failed_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Moves a job from `provisioning` to its terminal outcome (`succeeded`
    /// or `failed`) and on to `complete` in one atomic step (spec.md §4.10
    /// step g) — a crash between the two transitions must never be
    /// observable, since `claim_next_job` only ever picks up `queued` rows
    /// and nothing re-polls a job stuck in `succeeded`/`failed`.
    async fn finish_job(
        &self,
        job_id: JobId,
        terminal: JobStatus,
        failed_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn append_event(&self, event: JobEvent) -> Result<JobEvent, StoreError>;
    async fn list_events(&self, job_id: JobId) -> Result<Vec<JobEvent>, StoreError>;

    /// Records a webhook delivery. Returns `true` if this is the first time
    /// `delivery.delivery_id` has been seen, `false` if it's a duplicate
    /// (P6: exactly one JobEvent/WebhookDelivery row per delivery id).
    async fn record_webhook_delivery(&self, delivery: &WebhookDelivery) -> Result<bool, StoreError>;
    async fn get_webhook_delivery(
        &self,
        delivery_id: DeliveryId,
    ) -> Result<Option<WebhookDelivery>, StoreError>;
}
