use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide registry metrics. Per spec.md §9, this struct plus the
/// upload-session map are the only global mutable state the core holds;
/// both are encapsulated behind internal synchronisation (here, atomics).
#[derive(Default)]
pub struct Metrics {
    pub upload_bytes_total: AtomicU64,
    pub download_bytes_total: AtomicU64,
    pub requests_total: AtomicU64,
    pub upload_errors_total: AtomicU64,
    pub download_errors_total: AtomicU64,
    pub gc_runs_total: AtomicU64,
    pub gc_deletes_total: AtomicU64,
    pub gc_last_duration_ms: AtomicU64,
}

impl Metrics {
    pub fn record_upload(&self, bytes: u64) {
        self.upload_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: u64) {
        self.download_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_error(&self) {
        self.upload_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download_error(&self) {
        self.download_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gc_run(&self, deletes: u64, duration_ms: u64) {
        self.gc_runs_total.fetch_add(1, Ordering::Relaxed);
        self.gc_deletes_total.fetch_add(deletes, Ordering::Relaxed);
        self.gc_last_duration_ms.store(duration_ms, Ordering::Relaxed);
    }

    /// Renders metrics in Prometheus text exposition format, named
    /// `registry_*` per spec.md §6.
    pub fn render(&self, storage_bytes: u64, blob_count: u64) -> String {
        format!(
            "# TYPE registry_upload_bytes_total counter\n\
             registry_upload_bytes_total {}\n\
             # TYPE registry_download_bytes_total counter\n\
             registry_download_bytes_total {}\n\
             # TYPE registry_requests_total counter\n\
             registry_requests_total {}\n\
             # TYPE registry_upload_errors_total counter\n\
             registry_upload_errors_total {}\n\
             # TYPE registry_download_errors_total counter\n\
             registry_download_errors_total {}\n\
             # TYPE registry_gc_runs_total counter\n\
             registry_gc_runs_total {}\n\
             # TYPE registry_gc_deletes_total counter\n\
             registry_gc_deletes_total {}\n\
             # TYPE registry_gc_last_duration_ms gauge\n\
             registry_gc_last_duration_ms {}\n\
             # TYPE registry_storage_bytes gauge\n\
             registry_storage_bytes {}\n\
             # TYPE registry_blob_count gauge\n\
             registry_blob_count {}\n",
            self.upload_bytes_total.load(Ordering::Relaxed),
            self.download_bytes_total.load(Ordering::Relaxed),
            self.requests_total.load(Ordering::Relaxed),
            self.upload_errors_total.load(Ordering::Relaxed),
            self.download_errors_total.load(Ordering::Relaxed),
            self.gc_runs_total.load(Ordering::Relaxed),
            self.gc_deletes_total.load(Ordering::Relaxed),
            self.gc_last_duration_ms.load(Ordering::Relaxed),
            storage_bytes,
            blob_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_values() {
        let metrics = Metrics::default();
        metrics.record_upload(1024);
        metrics.record_request();
        let rendered = metrics.render(2048, 3);
        assert!(rendered.contains("registry_upload_bytes_total 1024"));
        assert!(rendered.contains("registry_requests_total 1"));
        assert!(rendered.contains("registry_storage_bytes 2048"));
    }
}
