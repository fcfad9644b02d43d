use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoal_domain::{DeliveryId, Job, JobEvent, JobId, JobStatus, Server, WebhookDelivery};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    servers: HashMap<String, Server>,
    jobs: HashMap<JobId, Job>,
    events: Vec<JobEvent>,
    next_event_id: i64,
    deliveries: HashMap<DeliveryId, WebhookDelivery>,
}

/// In-memory [`StateStore`]. All data is lost on process exit — used by
/// tests and any standalone demo that doesn't want a real Postgres.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_server(&self, serial: &str) -> Result<Option<Server>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.servers.get(serial).cloned())
    }

    async fn upsert_server(&self, server: &Server) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.servers.insert(server.serial.clone(), server.clone());
        Ok(())
    }

    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.jobs.get(&id).cloned())
    }

    async fn get_active_job_for_serial(&self, serial: &str) -> Result<Option<Job>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .jobs
            .values()
            .filter(|job| job.server_serial == serial && !job.status.is_terminal())
            .max_by_key(|job| job.created_at)
            .cloned())
    }

    async fn claim_next_job(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_ttl: chrono::Duration,
    ) -> Result<Option<Job>, StoreError> {
        let mut guard = self.inner.write().await;
        let candidate = guard
            .jobs
            .values_mut()
            .filter(|job| {
                job.status == JobStatus::Queued
                    && job.lease_expires_at.map_or(true, |exp| exp <= now)
            })
            .min_by_key(|job| job.created_at)
            .map(|job| job.id);

        let Some(job_id) = candidate else {
            return Ok(None);
        };

        let job = guard.jobs.get_mut(&job_id).expect("candidate id just found");
        job.status = JobStatus::Provisioning;
        job.worker_id = Some(worker_id.to_string());
        job.picked_at = Some(now);
        job.lease_expires_at = Some(now + lease_ttl);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn extend_lease(
        &self,
        job_id: JobId,
        worker_id: &str,
        new_lease_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(job) = guard.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Provisioning || job.worker_id.as_deref() != Some(worker_id) {
            return Ok(false);
        }
        job.lease_expires_at = Some(new_lease_expires_at);
        Ok(true)
    }

    async fn set_task_iso_path(&self, job_id: JobId, path: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.task_iso_path = Some(path.to_string());
        Ok(())
    }

    async fn transition_job(
        &self,
        job_id: JobId,
        next: JobStatus,
        failed_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.transition(next, now)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        if let Some(step) = failed_step {
            job.failed_step = Some(step.to_string());
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: JobId,
        terminal: JobStatus,
        failed_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.transition(terminal, now)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        if let Some(step) = failed_step {
            job.failed_step = Some(step.to_string());
        }
        job.transition(JobStatus::Complete, now)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn append_event(&self, mut event: JobEvent) -> Result<JobEvent, StoreError> {
        let mut guard = self.inner.write().await;
        guard.next_event_id += 1;
        event.id = guard.next_event_id;
        guard.events.push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, job_id: JobId) -> Result<Vec<JobEvent>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .events
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn record_webhook_delivery(&self, delivery: &WebhookDelivery) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.deliveries.contains_key(&delivery.delivery_id) {
            return Ok(false);
        }
        guard.deliveries.insert(delivery.delivery_id, delivery.clone());
        Ok(true)
    }

    async fn get_webhook_delivery(
        &self,
        delivery_id: DeliveryId,
    ) -> Result<Option<WebhookDelivery>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.deliveries.get(&delivery_id).cloned())
    }
}
