use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide Redfish call metrics. The only shared mutable state the
/// retry helper touches, same shape as `shoal_registry::Metrics`.
#[derive(Default)]
pub struct Metrics {
    pub attempts_total: AtomicU64,
    pub retries_total: AtomicU64,
    pub successes_total: AtomicU64,
    pub failures_total: AtomicU64,
    pub last_duration_ms: AtomicU64,
}

impl Metrics {
    /// Records one attempt. `operation` and `vendor` are carried as
    /// structured `tracing` fields rather than label dimensions on the
    /// atomics themselves, matching the registry's "counters plus
    /// structured logs" split.
    pub fn record_attempt(&self, operation: &str, vendor: &str, status: &str, duration_ms: u64, retried: bool) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
        if retried {
            self.retries_total.fetch_add(1, Ordering::Relaxed);
        }
        self.last_duration_ms.store(duration_ms, Ordering::Relaxed);
        tracing::debug!(operation, vendor, status, duration_ms, "redfish attempt");
    }

    pub fn record_outcome(&self, success: bool) {
        if success {
            self.successes_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_attempts_and_outcomes() {
        let metrics = Metrics::default();
        metrics.record_attempt("insert_virtual_media", "dell", "200", 42, false);
        metrics.record_outcome(true);
        assert_eq!(metrics.attempts_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.successes_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.last_duration_ms.load(Ordering::Relaxed), 42);
    }
}
