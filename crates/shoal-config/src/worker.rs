use std::time::Duration;

use crate::env::var_parsed_or;
use crate::error::ConfigError;

/// Flat worker-pool configuration, per spec.md §4.10: an opaque id, a poll
/// interval, a lease TTL, an extend-lease interval, a stuck-job timeout, a
/// Redfish timeout, and a task-ISO media base URL.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub lease_ttl: Duration,
    pub extend_lease_every: Duration,
    pub stuck_job_timeout: Duration,
    pub redfish_timeout: Duration,
    pub task_iso_media_base_url: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = WorkerConfig {
            worker_id: std::env::var("WORKER_ID").unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4())),
            poll_interval: Duration::from_millis(var_parsed_or("WORKER_POLL_INTERVAL_MS", 1000u64)?),
            lease_ttl: Duration::from_secs(var_parsed_or("WORKER_LEASE_TTL_SECS", 60u64)?),
            extend_lease_every: Duration::from_secs(var_parsed_or("WORKER_EXTEND_LEASE_EVERY_SECS", 20u64)?),
            stuck_job_timeout: Duration::from_secs(var_parsed_or("WORKER_STUCK_JOB_TIMEOUT_SECS", 1800u64)?),
            redfish_timeout: Duration::from_secs(var_parsed_or("WORKER_REDFISH_TIMEOUT_SECS", 30u64)?),
            task_iso_media_base_url: std::env::var("WORKER_TASK_ISO_MEDIA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/media/tasks".to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "WORKER_ID".into(),
                message: "must not be empty".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "WORKER_POLL_INTERVAL_MS".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.extend_lease_every >= self.lease_ttl {
            return Err(ConfigError::Invalid {
                field: "WORKER_EXTEND_LEASE_EVERY_SECS".into(),
                message: "must be smaller than WORKER_LEASE_TTL_SECS or the lease will expire between extensions".into(),
            });
        }
        if url::Url::parse(&self.task_iso_media_base_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "WORKER_TASK_ISO_MEDIA_BASE_URL".into(),
                message: "must be a valid URL".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_worker_env() {
        for key in [
            "WORKER_ID",
            "WORKER_POLL_INTERVAL_MS",
            "WORKER_LEASE_TTL_SECS",
            "WORKER_EXTEND_LEASE_EVERY_SECS",
            "WORKER_STUCK_JOB_TIMEOUT_SECS",
            "WORKER_REDFISH_TIMEOUT_SECS",
            "WORKER_TASK_ISO_MEDIA_BASE_URL",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_validate_cleanly() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_worker_env();
        assert!(WorkerConfig::from_env().is_ok());
    }

    #[test]
    fn extend_lease_must_be_shorter_than_ttl() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_worker_env();
        std::env::set_var("WORKER_LEASE_TTL_SECS", "10");
        std::env::set_var("WORKER_EXTEND_LEASE_EVERY_SECS", "10");
        let err = WorkerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "WORKER_EXTEND_LEASE_EVERY_SECS"));
        clear_worker_env();
    }
}
