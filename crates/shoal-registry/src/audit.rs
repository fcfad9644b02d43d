use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::error::RegistryError;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord<'a> {
    pub time: chrono::DateTime<Utc>,
    pub method: &'a str,
    pub path: &'a str,
    pub status: u16,
    pub remote_user: Option<&'a str>,
}

/// Append-only JSON-lines audit log, enabled by `REGISTRY_ENABLE_AUDIT_LOG`.
/// One line per request; writes are serialised to keep lines from
/// interleaving under concurrent handlers.
pub struct AuditLog {
    file: Mutex<std::fs::File>,
}

impl AuditLog {
    pub fn open(path: &PathBuf) -> Result<Self, RegistryError> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(AuditLog { file: Mutex::new(file) })
    }

    pub fn record(&self, record: &AuditRecord<'_>) {
        let Ok(line) = serde_json::to_string(record) else { return };
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_a_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();
        log.record(&AuditRecord {
            time: Utc::now(),
            method: "GET",
            path: "/v2/",
            status: 200,
            remote_user: None,
        });
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"status\":200"));
    }
}
