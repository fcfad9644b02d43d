use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::RedfishError;
use crate::metrics::Metrics;

/// Retry/backoff configuration shared by the worker and any direct Redfish
/// use (spec.md §4.11). Exponential backoff with jitter, mirroring the
/// `shipper-retry` crate's `calculate_delay` shape but async and specialised
/// to `RedfishError::is_retryable`.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter fraction, e.g. `0.3` for +/-30%.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            jitter: 0.3,
        }
    }
}

fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(16);
    let raw = cfg.base_delay.saturating_mul(2_u32.saturating_pow(pow));
    let capped = raw.min(cfg.max_delay);
    if cfg.jitter <= 0.0 {
        return capped;
    }
    let mut rng = rand::thread_rng();
    let factor = 1.0 - cfg.jitter + rng.r#gen::<f64>() * (2.0 * cfg.jitter);
    Duration::from_millis((capped.as_millis() as f64 * factor).round() as u64)
}

/// Runs `f` with retry/backoff. `operation` and `vendor` are metrics/log
/// labels. Honours `cancel`: if it fires between attempts, returns
/// `RedfishError::Cancelled` immediately instead of sleeping out the delay.
pub async fn retry<F, Fut, T>(
    operation: &str,
    vendor: &str,
    cfg: &RetryConfig,
    metrics: &Arc<Metrics>,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, RedfishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RedfishError>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RedfishError::Cancelled);
        }

        let started = Instant::now();
        let result = f().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                let status = "ok".to_string();
                metrics.record_attempt(operation, vendor, &status, duration_ms, attempt > 1);
                metrics.record_outcome(true);
                return Ok(value);
            }
            Err(e) => {
                metrics.record_attempt(operation, vendor, &e.status_label(), duration_ms, attempt > 1);
                let retryable = e.is_retryable();
                if !retryable || attempt >= cfg.max_attempts {
                    metrics.record_outcome(false);
                    return Err(e);
                }

                let delay = backoff_delay(cfg, attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        metrics.record_outcome(false);
                        return Err(RedfishError::Cancelled);
                    }
                }
                attempt += 1;
            }
        }
    }
}
