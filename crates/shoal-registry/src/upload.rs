use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::digest::Digest;
use crate::error::RegistryError;

struct UploadSession {
    temp_path: PathBuf,
    file: File,
    hasher: Sha256,
    offset: u64,
    created_at: Instant,
}

/// Tracks in-flight chunked uploads keyed by UUID. Sessions are explicitly
/// not crash-durable (spec.md §4.3): a restart abandons them and clients
/// retry, the same assumption `oras`/`podman` make about registries.
pub struct UploadManager {
    blobs: Arc<BlobStore>,
    sessions: DashMap<Uuid, UploadSession>,
    tmp_dir: PathBuf,
}

impl UploadManager {
    pub fn new(blobs: Arc<BlobStore>) -> Result<Self, RegistryError> {
        let tmp_dir = blobs.root().join("tmp");
        std::fs::create_dir_all(&tmp_dir)?;
        Ok(UploadManager { blobs, sessions: DashMap::new(), tmp_dir })
    }

    pub fn create_session(&self) -> Result<Uuid, RegistryError> {
        let id = Uuid::new_v4();
        let temp_path = self.tmp_dir.join(id.to_string());
        let file = File::create(&temp_path)?;
        self.sessions.insert(
            id,
            UploadSession { temp_path, file, hasher: Sha256::new(), offset: 0, created_at: Instant::now() },
        );
        Ok(id)
    }

    /// Streams `data` into the session's temp file and its running sha256
    /// hasher. Returns the new offset.
    pub fn append(&self, id: Uuid, data: &[u8]) -> Result<u64, RegistryError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| RegistryError::UploadUnknown(id.to_string()))?;
        session.file.write_all(data)?;
        session.hasher.update(data);
        session.offset += data.len() as u64;
        Ok(session.offset)
    }

    pub fn offset(&self, id: Uuid) -> Result<u64, RegistryError> {
        self.sessions
            .get(&id)
            .map(|s| s.offset)
            .ok_or_else(|| RegistryError::UploadUnknown(id.to_string()))
    }

    /// Finalises a session: fsyncs and closes the temp file, verifies
    /// `expected_digest` (if given) against the digest accumulated while
    /// streaming, and moves the temp file into the blob store by rename — the
    /// content is never re-read or re-buffered. A digest mismatch removes the
    /// temp file and fails without storing anything.
    pub fn complete(&self, id: Uuid, expected_digest: Option<&Digest>) -> Result<Digest, RegistryError> {
        let (_, session) = self
            .sessions
            .remove(&id)
            .ok_or_else(|| RegistryError::UploadUnknown(id.to_string()))?;

        session.file.sync_all()?;
        drop(session.file);
        let actual = Digest::from_hasher(session.hasher);
        if let Some(expected) = expected_digest {
            if expected != &actual {
                let _ = std::fs::remove_file(&session.temp_path);
                return Err(RegistryError::DigestMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        self.blobs.adopt_temp_file(&session.temp_path, &actual)?;
        Ok(actual)
    }

    pub fn cancel(&self, id: Uuid) -> Result<(), RegistryError> {
        if let Some((_, session)) = self.sessions.remove(&id) {
            let _ = std::fs::remove_file(&session.temp_path);
        }
        Ok(())
    }

    /// Sweeps sessions whose temp file is older than `max_age`, removing
    /// both the session entry and its temp file. Intended to run on a
    /// `tokio::time::interval`, mirroring the worker's lease-extender idiom.
    pub fn cleanup_expired(&self, max_age: Duration) -> usize {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.created_at.elapsed() > max_age)
            .map(|entry| *entry.key())
            .collect();
        let count = expired.len();
        for id in expired {
            let _ = self.cancel(id);
        }
        count
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, UploadManager) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(BlobStore::new(dir.path()).unwrap());
        (dir, UploadManager::new(blobs).unwrap())
    }

    #[test]
    fn append_then_complete_stores_blob() {
        let (_dir, mgr) = manager();
        let id = mgr.create_session().unwrap();
        mgr.append(id, b"hel").unwrap();
        let offset = mgr.append(id, b"lo").unwrap();
        assert_eq!(offset, 5);
        let digest = mgr.complete(id, None).unwrap();
        assert_eq!(digest, Digest::of(b"hello"));
        assert_eq!(mgr.session_count(), 0);
    }

    #[test]
    fn complete_rejects_digest_mismatch() {
        let (_dir, mgr) = manager();
        let id = mgr.create_session().unwrap();
        mgr.append(id, b"hello").unwrap();
        let wrong = Digest::of(b"nope");
        let err = mgr.complete(id, Some(&wrong)).unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch { .. }));
    }

    #[test]
    fn cancel_removes_session() {
        let (_dir, mgr) = manager();
        let id = mgr.create_session().unwrap();
        mgr.cancel(id).unwrap();
        assert!(matches!(mgr.offset(id), Err(RegistryError::UploadUnknown(_))));
    }

    #[test]
    fn cleanup_expired_sweeps_old_sessions() {
        let (_dir, mgr) = manager();
        let id = mgr.create_session().unwrap();
        let swept = mgr.cleanup_expired(Duration::from_secs(0));
        assert_eq!(swept, 1);
        assert!(matches!(mgr.offset(id), Err(RegistryError::UploadUnknown(_))));
    }
}
