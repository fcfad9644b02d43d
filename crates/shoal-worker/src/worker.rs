use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use shoal_config::WorkerConfig;
use shoal_domain::{Job, JobEvent, JobId, JobStatus, LogLevel, Server, WebhookStatus};
use shoal_redfish::{retry, Metrics as RedfishMetrics, RedfishClient, RedfishClientFactory, RedfishError, RetryConfig};
use shoal_store::StateStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::iso::{build_task_iso, IsoBuilder};

/// What the out-of-band status webhook reported for a job, handed to
/// [`WorkerLoop::notify_webhook`] by whatever HTTP handler terminates the
/// webhook request.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub status: WebhookStatus,
    pub failed_step: Option<String>,
}

#[derive(Default)]
struct JobWaiter {
    notify: Notify,
    outcome: Mutex<Option<WebhookOutcome>>,
}

fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

/// One worker's poll/claim/drive loop (spec.md §4.10), the structural
/// generalization of a reconciler's "load desired state, diff, act on each
/// item in isolation" shape applied to a single job at a time instead of a
/// whole desired-state tree.
pub struct WorkerLoop {
    store: Arc<dyn StateStore>,
    redfish_factory: Arc<dyn RedfishClientFactory>,
    iso_builder: Arc<dyn IsoBuilder>,
    cfg: WorkerConfig,
    task_root: PathBuf,
    metrics: Arc<RedfishMetrics>,
    waiters: Arc<DashMap<JobId, Arc<JobWaiter>>>,
    redfish_retry: RetryConfig,
}

impl WorkerLoop {
    pub fn new(
        store: Arc<dyn StateStore>,
        redfish_factory: Arc<dyn RedfishClientFactory>,
        iso_builder: Arc<dyn IsoBuilder>,
        cfg: WorkerConfig,
        task_root: PathBuf,
    ) -> Self {
        let redfish_retry = RetryConfig { max_delay: cfg.redfish_timeout, ..RetryConfig::default() };
        WorkerLoop {
            store,
            redfish_factory,
            iso_builder,
            cfg,
            task_root,
            metrics: Arc::new(RedfishMetrics::default()),
            waiters: Arc::new(DashMap::new()),
            redfish_retry,
        }
    }

    /// Overrides the Redfish retry/backoff policy — production callers
    /// never need this; tests use it to skip real sleeps.
    pub fn with_redfish_retry(mut self, cfg: RetryConfig) -> Self {
        self.redfish_retry = cfg;
        self
    }

    /// Wakes a job's `await_webhook` step with the reported outcome. A
    /// no-op if no job with this id is currently waiting (already timed
    /// out, already resolved by another delivery, or never claimed by this
    /// worker instance).
    pub fn notify_webhook(&self, job_id: JobId, outcome: WebhookOutcome) {
        if let Some(waiter) = self.waiters.get(&job_id) {
            *waiter.outcome.lock().unwrap() = Some(outcome);
            waiter.notify.notify_one();
        }
    }

    /// The persistent poll loop. Runs until `shutdown` fires; each claimed
    /// job is spawned as an independent task so polling never blocks on a
    /// single job's lifecycle.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claim = self
                .store
                .claim_next_job(&self.cfg.worker_id, Utc::now(), to_chrono(self.cfg.lease_ttl))
                .await;

            match claim {
                Ok(Some(job)) => {
                    let this = self.clone();
                    let job_token = shutdown.child_token();
                    tokio::spawn(async move {
                        let job_id = job.id;
                        if let Err(e) = this.run_job(job, job_token).await {
                            tracing::warn!(job_id = %job_id, error = %e, "job processing failed");
                        }
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "claim_next_job failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn run_job(self: Arc<Self>, job: Job, shutdown: CancellationToken) -> Result<(), WorkerError> {
        let job_id = job.id;
        self.append_event(job_id, LogLevel::Info, "Worker claimed job", None).await?;

        let lease_task = self.spawn_lease_extender(job_id, shutdown.clone());
        let outcome = self.drive_job(&job, &shutdown).await;
        lease_task.abort();

        let (status, failed_step) = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.append_event(job_id, LogLevel::Error, format!("worker error: {e}"), None)
                    .await
                    .ok();
                (JobStatus::Failed, Some("worker_error".to_string()))
            }
        };
        self.finish_job(job_id, status, failed_step).await
    }

    /// Steps c-f of spec.md §4.10: build the task ISO, drive the BMC through
    /// Redfish, await the out-of-band webhook, then best-effort cleanup.
    /// Cleanup runs even if an earlier step failed, matching the teacher's
    /// "errors in one item don't block teardown of the rest" isolation.
    async fn drive_job(
        &self,
        job: &Job,
        shutdown: &CancellationToken,
    ) -> Result<(JobStatus, Option<String>), WorkerError> {
        let iso_path = self.build_task_iso(job).await?;
        self.store.set_task_iso_path(job.id, &iso_path).await?;

        let server = self
            .store
            .get_server(&job.server_serial)
            .await?
            .ok_or_else(|| WorkerError::ServerNotFound(job.server_serial.clone()))?;
        let client = self.redfish_factory.client_for(&server);

        self.insert_media(&client, &server, &job.maintenance_iso_url, shutdown).await?;
        self.set_one_time_boot(&client, &server, shutdown).await?;
        self.power_cycle(&client, &server, shutdown).await?;

        let (status, failed_step) = self.await_webhook(job.id, shutdown).await;

        if let Err(e) = self.eject_media(&client, &server, shutdown).await {
            tracing::warn!(job_id = %job.id, error = %e, "best-effort virtual media eject failed");
        }
        if let Err(e) = self.clear_boot_override(&client, &server, shutdown).await {
            tracing::warn!(job_id = %job.id, error = %e, "best-effort boot override clear failed");
        }
        self.delete_task_iso(job.id).await;

        Ok((status, failed_step))
    }

    async fn insert_media(
        &self,
        client: &Arc<dyn RedfishClient>,
        server: &Server,
        image_url: &str,
        shutdown: &CancellationToken,
    ) -> Result<(), RedfishError> {
        let cfg = self.redfish_retry;
        let image_url = image_url.to_string();
        retry("insert_virtual_media", &server.vendor_tag, &cfg, &self.metrics, shutdown, || {
            let client = client.clone();
            let image_url = image_url.clone();
            async move { client.insert_virtual_media(&image_url).await }
        })
        .await
    }

    async fn set_one_time_boot(
        &self,
        client: &Arc<dyn RedfishClient>,
        server: &Server,
        shutdown: &CancellationToken,
    ) -> Result<(), RedfishError> {
        let cfg = self.redfish_retry;
        retry("set_one_time_boot_virtual_media", &server.vendor_tag, &cfg, &self.metrics, shutdown, || {
            let client = client.clone();
            async move { client.set_one_time_boot_virtual_media().await }
        })
        .await
    }

    async fn power_cycle(
        &self,
        client: &Arc<dyn RedfishClient>,
        server: &Server,
        shutdown: &CancellationToken,
    ) -> Result<(), RedfishError> {
        let cfg = self.redfish_retry;
        retry("power_cycle", &server.vendor_tag, &cfg, &self.metrics, shutdown, || {
            let client = client.clone();
            async move { client.power_cycle().await }
        })
        .await
    }

    async fn eject_media(
        &self,
        client: &Arc<dyn RedfishClient>,
        server: &Server,
        shutdown: &CancellationToken,
    ) -> Result<(), RedfishError> {
        let cfg = self.redfish_retry;
        retry("eject_virtual_media", &server.vendor_tag, &cfg, &self.metrics, shutdown, || {
            let client = client.clone();
            async move { client.eject_virtual_media().await }
        })
        .await
    }

    async fn clear_boot_override(
        &self,
        client: &Arc<dyn RedfishClient>,
        server: &Server,
        shutdown: &CancellationToken,
    ) -> Result<(), RedfishError> {
        let cfg = self.redfish_retry;
        retry("clear_boot_override", &server.vendor_tag, &cfg, &self.metrics, shutdown, || {
            let client = client.clone();
            async move { client.clear_boot_override().await }
        })
        .await
    }

    /// Waits on the per-job notification with deadline `stuck_job_timeout`.
    async fn await_webhook(&self, job_id: JobId, shutdown: &CancellationToken) -> (JobStatus, Option<String>) {
        let waiter = Arc::new(JobWaiter::default());
        self.waiters.insert(job_id, waiter.clone());

        let deadline = tokio::time::sleep(self.cfg.stuck_job_timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = waiter.notify.notified() => {
                    if let Some(outcome) = waiter.outcome.lock().unwrap().take() {
                        break Some(outcome);
                    }
                }
                _ = &mut deadline => break None,
                _ = shutdown.cancelled() => break None,
            }
        };
        self.waiters.remove(&job_id);

        match outcome {
            Some(WebhookOutcome { status: WebhookStatus::Success, .. }) => {
                self.append_event(job_id, LogLevel::Info, "Webhook reported success", None).await.ok();
                (JobStatus::Succeeded, None)
            }
            Some(WebhookOutcome { status: WebhookStatus::Failed, failed_step }) => {
                self.append_event(job_id, LogLevel::Error, "Webhook reported failure", failed_step.clone())
                    .await
                    .ok();
                (JobStatus::Failed, failed_step)
            }
            None => {
                self.append_event(job_id, LogLevel::Error, "Webhook wait timeout", None).await.ok();
                (JobStatus::Failed, Some("webhook_timeout".to_string()))
            }
        }
    }

    async fn finish_job(&self, job_id: JobId, status: JobStatus, failed_step: Option<String>) -> Result<(), WorkerError> {
        let now = Utc::now();
        self.store.finish_job(job_id, status, failed_step.as_deref(), now).await?;
        Ok(())
    }

    fn spawn_lease_extender(&self, job_id: JobId, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let worker_id = self.cfg.worker_id.clone();
        let every = self.cfg.extend_lease_every;
        let ttl = self.cfg.lease_ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // first tick fires immediately; the claim already set the initial lease
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        match store.extend_lease(job_id, &worker_id, now + to_chrono(ttl)).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::warn!(job_id = %job_id, "lease lost or job left provisioning, stopping extender");
                                break;
                            }
                            Err(e) => tracing::error!(job_id = %job_id, error = %e, "failed to extend lease"),
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }

    async fn build_task_iso(&self, job: &Job) -> Result<String, WorkerError> {
        let task_root = self.task_root.clone();
        let builder = self.iso_builder.clone();
        let job = job.clone();
        let output = tokio::task::spawn_blocking(move || build_task_iso(builder.as_ref(), &task_root, &job))
            .await
            .map_err(|e| WorkerError::Internal(e.to_string()))??;
        Ok(output.to_string_lossy().to_string())
    }

    async fn delete_task_iso(&self, job_id: JobId) {
        let path = self.task_root.join(job_id.to_string());
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "failed to clean up task iso directory"),
        }
    }

    async fn append_event(
        &self,
        job_id: JobId,
        level: LogLevel,
        message: impl Into<String>,
        step: Option<String>,
    ) -> Result<(), WorkerError> {
        let mut event = JobEvent::new(job_id, level, message);
        if let Some(step) = step {
            event = event.with_step(step);
        }
        self.store.append_event(event).await?;
        Ok(())
    }
}
