use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoal_domain::{DeliveryId, Job, JobEvent, JobId, JobStatus, LogLevel, Recipe, Server, WebhookDelivery, WebhookStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::StateStore;

// DDL — idempotent; run at every startup via migrate(). Schema ownership and
// proper migration tooling are out of core scope (spec.md §1); this mirrors
// it just enough to be self-contained for local/dev use.
const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS servers (
    serial        TEXT PRIMARY KEY,
    bmc_endpoint  TEXT NOT NULL,
    bmc_user      TEXT NOT NULL,
    bmc_password  TEXT NOT NULL,
    vendor_tag    TEXT NOT NULL,
    last_seen     TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id                   UUID PRIMARY KEY,
    server_serial        TEXT NOT NULL,
    status               TEXT NOT NULL,
    recipe               JSONB NOT NULL,
    failed_step          TEXT,
    created_at           TIMESTAMPTZ NOT NULL,
    updated_at           TIMESTAMPTZ NOT NULL,
    picked_at            TIMESTAMPTZ,
    worker_id            TEXT,
    lease_expires_at     TIMESTAMPTZ,
    task_iso_path        TEXT,
    maintenance_iso_url  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_claimable
    ON jobs (created_at) WHERE status = 'queued';

CREATE TABLE IF NOT EXISTS job_events (
    id       BIGSERIAL PRIMARY KEY,
    job_id   UUID NOT NULL,
    time     TIMESTAMPTZ NOT NULL,
    level    TEXT NOT NULL,
    message  TEXT NOT NULL,
    step     TEXT
);
CREATE INDEX IF NOT EXISTS idx_job_events_job ON job_events (job_id, time, id);

CREATE TABLE IF NOT EXISTS webhook_deliveries (
    delivery_id  UUID PRIMARY KEY,
    job_id       UUID NOT NULL,
    status       TEXT NOT NULL,
    failed_step  TEXT
);
"#;

/// Persistent state store backed by PostgreSQL. All tables are created
/// automatically on connect via [`PostgresStore::connect`]. The job-claim
/// path uses a single conditional `UPDATE ... RETURNING` with `FOR UPDATE
/// SKIP LOCKED` so concurrent workers never double-claim a job (P5).
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| StoreError::Internal(format!("postgres connect: {e}")))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Runs all DDL migrations. Safe to call on every startup.
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Internal(format!("migration: {e}")))?;
        Ok(())
    }
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Provisioning => "provisioning",
        JobStatus::Succeeded => "succeeded",
        JobStatus::Failed => "failed",
        JobStatus::Complete => "complete",
    }
}

fn parse_status(s: &str) -> Result<JobStatus, StoreError> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "provisioning" => Ok(JobStatus::Provisioning),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        "complete" => Ok(JobStatus::Complete),
        other => Err(StoreError::Internal(format!("unknown job status '{other}' in database"))),
    }
}

fn level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn parse_level(s: &str) -> Result<LogLevel, StoreError> {
    match s {
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(StoreError::Internal(format!("unknown log level '{other}' in database"))),
    }
}

fn webhook_status_str(status: WebhookStatus) -> &'static str {
    match status {
        WebhookStatus::Success => "success",
        WebhookStatus::Failed => "failed",
    }
}

fn parse_webhook_status(s: &str) -> Result<WebhookStatus, StoreError> {
    match s {
        "success" => Ok(WebhookStatus::Success),
        "failed" => Ok(WebhookStatus::Failed),
        other => Err(StoreError::Internal(format!("unknown webhook status '{other}' in database"))),
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, StoreError> {
    let recipe: serde_json::Value = row.try_get("recipe").map_err(sqlx_err)?;
    Ok(Job {
        id: JobId(row.try_get::<Uuid, _>("id").map_err(sqlx_err)?),
        server_serial: row.try_get("server_serial").map_err(sqlx_err)?,
        status: parse_status(row.try_get::<String, _>("status").map_err(sqlx_err)?.as_str())?,
        recipe: serde_json::from_value::<Recipe>(recipe)?,
        failed_step: row.try_get("failed_step").map_err(sqlx_err)?,
        created_at: row.try_get("created_at").map_err(sqlx_err)?,
        updated_at: row.try_get("updated_at").map_err(sqlx_err)?,
        picked_at: row.try_get("picked_at").map_err(sqlx_err)?,
        worker_id: row.try_get("worker_id").map_err(sqlx_err)?,
        lease_expires_at: row.try_get("lease_expires_at").map_err(sqlx_err)?,
        task_iso_path: row.try_get("task_iso_path").map_err(sqlx_err)?,
        maintenance_iso_url: row.try_get("maintenance_iso_url").map_err(sqlx_err)?,
    })
}

fn sqlx_err(e: sqlx::Error) -> StoreError {
    StoreError::Internal(e.to_string())
}

const JOB_COLUMNS: &str = "id, server_serial, status, recipe, failed_step, created_at, \
    updated_at, picked_at, worker_id, lease_expires_at, task_iso_path, maintenance_iso_url";

#[async_trait]
impl StateStore for PostgresStore {
    async fn get_server(&self, serial: &str) -> Result<Option<Server>, StoreError> {
        let row = sqlx::query(
            "SELECT serial, bmc_endpoint, bmc_user, bmc_password, vendor_tag, last_seen FROM servers WHERE serial = $1",
        )
        .bind(serial)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?;

        row.map(|r| {
            Ok(Server {
                serial: r.try_get("serial").map_err(sqlx_err)?,
                bmc_endpoint: r.try_get("bmc_endpoint").map_err(sqlx_err)?,
                bmc_user: r.try_get("bmc_user").map_err(sqlx_err)?,
                bmc_password: r.try_get("bmc_password").map_err(sqlx_err)?,
                vendor_tag: r.try_get("vendor_tag").map_err(sqlx_err)?,
                last_seen: r.try_get("last_seen").map_err(sqlx_err)?,
            })
        })
        .transpose()
    }

    async fn upsert_server(&self, server: &Server) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO servers (serial, bmc_endpoint, bmc_user, bmc_password, vendor_tag, last_seen) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (serial) DO UPDATE SET \
                bmc_endpoint = EXCLUDED.bmc_endpoint, bmc_user = EXCLUDED.bmc_user, \
                bmc_password = EXCLUDED.bmc_password, vendor_tag = EXCLUDED.vendor_tag, \
                last_seen = EXCLUDED.last_seen",
        )
        .bind(&server.serial)
        .bind(&server.bmc_endpoint)
        .bind(&server.bmc_user)
        .bind(&server.bmc_password)
        .bind(&server.vendor_tag)
        .bind(server.last_seen)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let recipe = serde_json::to_value(&job.recipe)?;
        sqlx::query(
            "INSERT INTO jobs (id, server_serial, status, recipe, failed_step, created_at, \
             updated_at, picked_at, worker_id, lease_expires_at, task_iso_path, maintenance_iso_url) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(job.id.as_uuid())
        .bind(&job.server_serial)
        .bind(status_str(job.status))
        .bind(recipe)
        .bind(&job.failed_step)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.picked_at)
        .bind(&job.worker_id)
        .bind(job.lease_expires_at)
        .bind(&job.task_iso_path)
        .bind(&job.maintenance_iso_url)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn get_active_job_for_serial(&self, serial: &str) -> Result<Option<Job>, StoreError> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE server_serial = $1 AND status <> 'complete' \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(serial)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn claim_next_job(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_ttl: chrono::Duration,
    ) -> Result<Option<Job>, StoreError> {
        let lease_expires_at = now + lease_ttl;
        let query = format!(
            "UPDATE jobs SET status = 'provisioning', worker_id = $1, picked_at = $2, \
             lease_expires_at = $3, updated_at = $2 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = 'queued' AND (lease_expires_at IS NULL OR lease_expires_at <= $2) \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(worker_id)
            .bind(now)
            .bind(lease_expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn extend_lease(
        &self,
        job_id: JobId,
        worker_id: &str,
        new_lease_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET lease_expires_at = $1 \
             WHERE id = $2 AND worker_id = $3 AND status = 'provisioning'",
        )
        .bind(new_lease_expires_at)
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_task_iso_path(&self, job_id: JobId, path: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE jobs SET task_iso_path = $1 WHERE id = $2")
            .bind(path)
            .bind(job_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn transition_job(
        &self,
        job_id: JobId,
        next: JobStatus,
        failed_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.transition(next, now)
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        sqlx::query(
            "UPDATE jobs SET status = $1, failed_step = COALESCE($2, failed_step), updated_at = $3 \
             WHERE id = $4",
        )
        .bind(status_str(next))
        .bind(failed_step)
        .bind(now)
        .bind(job_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: JobId,
        terminal: JobStatus,
        failed_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;

        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"))
            .bind(job_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_err)?;
        let mut job = row
            .as_ref()
            .map(row_to_job)
            .transpose()?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        job.transition(terminal, now)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        job.transition(JobStatus::Complete, now)
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        sqlx::query(
            "UPDATE jobs SET status = $1, failed_step = COALESCE($2, failed_step), updated_at = $3 \
             WHERE id = $4",
        )
        .bind(status_str(JobStatus::Complete))
        .bind(failed_step)
        .bind(now)
        .bind(job_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(sqlx_err)?;

        tx.commit().await.map_err(sqlx_err)?;
        Ok(())
    }

    async fn append_event(&self, event: JobEvent) -> Result<JobEvent, StoreError> {
        let row = sqlx::query(
            "INSERT INTO job_events (job_id, time, level, message, step) \
             VALUES ($1,$2,$3,$4,$5) RETURNING id",
        )
        .bind(event.job_id.as_uuid())
        .bind(event.time)
        .bind(level_str(event.level))
        .bind(&event.message)
        .bind(&event.step)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err)?;

        let id: i64 = row.try_get("id").map_err(sqlx_err)?;
        Ok(JobEvent { id, ..event })
    }

    async fn list_events(&self, job_id: JobId) -> Result<Vec<JobEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, job_id, time, level, message, step FROM job_events \
             WHERE job_id = $1 ORDER BY time ASC, id ASC",
        )
        .bind(job_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.iter()
            .map(|r| {
                Ok(JobEvent {
                    id: r.try_get("id").map_err(sqlx_err)?,
                    job_id: JobId(r.try_get::<Uuid, _>("job_id").map_err(sqlx_err)?),
                    time: r.try_get("time").map_err(sqlx_err)?,
                    level: parse_level(r.try_get::<String, _>("level").map_err(sqlx_err)?.as_str())?,
                    message: r.try_get("message").map_err(sqlx_err)?,
                    step: r.try_get("step").map_err(sqlx_err)?,
                })
            })
            .collect()
    }

    async fn record_webhook_delivery(&self, delivery: &WebhookDelivery) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO webhook_deliveries (delivery_id, job_id, status, failed_step) \
             VALUES ($1,$2,$3,$4) ON CONFLICT (delivery_id) DO NOTHING",
        )
        .bind(delivery.delivery_id.0)
        .bind(delivery.job_id.as_uuid())
        .bind(webhook_status_str(delivery.status))
        .bind(&delivery.failed_step)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_webhook_delivery(
        &self,
        delivery_id: DeliveryId,
    ) -> Result<Option<WebhookDelivery>, StoreError> {
        let row = sqlx::query(
            "SELECT delivery_id, job_id, status, failed_step FROM webhook_deliveries WHERE delivery_id = $1",
        )
        .bind(delivery_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?;

        row.map(|r| {
            Ok(WebhookDelivery {
                job_id: JobId(r.try_get::<Uuid, _>("job_id").map_err(sqlx_err)?),
                status: parse_webhook_status(r.try_get::<String, _>("status").map_err(sqlx_err)?.as_str())?,
                failed_step: r.try_get("failed_step").map_err(sqlx_err)?,
                delivery_id: DeliveryId(r.try_get::<Uuid, _>("delivery_id").map_err(sqlx_err)?),
            })
        })
        .transpose()
    }
}
