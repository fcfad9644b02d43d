use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shoal_domain::atomic::write_atomic;

use crate::blob::BlobStore;
use crate::digest::Digest;
use crate::error::RegistryError;
use crate::manifest::ManifestStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuarantineEntry {
    #[serde(rename = "quarantinedAt")]
    quarantined_at: DateTime<Utc>,
    #[serde(rename = "blobDigest")]
    blob_digest: String,
    size: u64,
}

/// Stats from a single GC pass, per spec.md §4.5 step 4.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcStats {
    pub scanned: usize,
    pub quarantined: usize,
    pub deleted: usize,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

/// Background garbage collector: quarantines unreferenced blobs, then
/// deletes them once they've survived a full grace period across at least
/// two passes (spec.md §4.5's "never delete on the same pass it is
/// quarantined" invariant).
pub struct GarbageCollector {
    blobs: Arc<BlobStore>,
    manifests: Arc<ManifestStore>,
    quarantine_dir: PathBuf,
    grace_period: chrono::Duration,
}

impl GarbageCollector {
    pub fn new(
        blobs: Arc<BlobStore>,
        manifests: Arc<ManifestStore>,
        grace_period: chrono::Duration,
    ) -> Result<Self, RegistryError> {
        let quarantine_dir = blobs.root().join("quarantine");
        std::fs::create_dir_all(&quarantine_dir)?;
        Ok(GarbageCollector { blobs, manifests, quarantine_dir, grace_period })
    }

    fn quarantine_path(&self, digest: &Digest) -> PathBuf {
        self.quarantine_dir.join(digest.hex())
    }

    fn read_quarantine(&self, digest: &Digest) -> Option<QuarantineEntry> {
        let bytes = std::fs::read(self.quarantine_path(digest)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn write_quarantine(&self, digest: &Digest, size: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let entry = QuarantineEntry {
            quarantined_at: now,
            blob_digest: digest.to_string(),
            size,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| RegistryError::Internal(e.to_string()))?;
        write_atomic(&self.quarantine_path(digest), &bytes)?;
        Ok(())
    }

    fn remove_quarantine(&self, digest: &Digest) {
        let _ = std::fs::remove_file(self.quarantine_path(digest));
    }

    /// Walks every repository's tags, resolving each to a manifest and
    /// collecting the digests of everything it references. Individually
    /// broken tags/manifests are skipped, not fatal (spec.md §4.5).
    fn reachable_set(&self, stats: &mut GcStats) -> HashSet<Digest> {
        let mut reachable = HashSet::new();
        let digests = match self.manifests.tags().list_all_digests() {
            Ok(d) => d,
            Err(e) => {
                stats.errors.push(format!("listing tags: {e}"));
                return reachable;
            }
        };
        for digest in digests {
            reachable.insert(digest.clone());
            match self.blobs.read(&digest) {
                Ok(bytes) => {
                    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                        collect_referenced_digests(&value, &mut reachable);
                    }
                }
                Err(e) => stats.errors.push(format!("reading manifest {digest}: {e}")),
            }
        }
        reachable
    }

    /// Runs one GC pass. Never panics or aborts on a per-blob error — those
    /// are recorded in [`GcStats::errors`] and the pass continues.
    pub fn run(&self, now: DateTime<Utc>) -> GcStats {
        let mut stats = GcStats::default();
        let reachable = self.reachable_set(&mut stats);

        let all_blobs = match self.blobs.list_digests() {
            Ok(d) => d,
            Err(e) => {
                stats.errors.push(format!("listing blobs: {e}"));
                return stats;
            }
        };
        stats.scanned = all_blobs.len();

        for digest in all_blobs {
            if reachable.contains(&digest) {
                self.remove_quarantine(&digest);
                continue;
            }

            match self.read_quarantine(&digest) {
                Some(entry) if entry.quarantined_at + self.grace_period <= now => {
                    let size = self.blobs.size_of(&digest).unwrap_or(0);
                    match self.blobs.remove(&digest) {
                        Ok(()) => {
                            self.remove_quarantine(&digest);
                            stats.deleted += 1;
                            stats.bytes_freed += size;
                        }
                        Err(e) => stats.errors.push(format!("deleting {digest}: {e}")),
                    }
                }
                Some(_) => {
                    // Still within grace period; leave it quarantined.
                }
                None => {
                    let size = self.blobs.size_of(&digest).unwrap_or(0);
                    if let Err(e) = self.write_quarantine(&digest, size, now) {
                        stats.errors.push(format!("quarantining {digest}: {e}"));
                    } else {
                        stats.quarantined += 1;
                    }
                }
            }
        }

        stats
    }
}

/// Walks a parsed manifest JSON and inserts every digest found in `config`,
/// `layers[]`, `blobs[]`, or `subject`.
fn collect_referenced_digests(value: &Value, out: &mut HashSet<Digest>) {
    let mut push = |v: &Value| {
        if let Some(s) = v.get("digest").and_then(Value::as_str) {
            if let Ok(d) = Digest::parse(s) {
                out.insert(d);
            }
        }
    };
    if let Some(config) = value.get("config") {
        push(config);
    }
    if let Some(subject) = value.get("subject") {
        push(subject);
    }
    for key in ["layers", "blobs"] {
        if let Some(Value::Array(items)) = value.get(key) {
            for item in items {
                push(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Arc<BlobStore>, Arc<ManifestStore>) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(BlobStore::new(dir.path()).unwrap());
        let manifests = Arc::new(ManifestStore::new(blobs.clone()));
        (dir, blobs, manifests)
    }

    #[test]
    fn unreferenced_blob_is_quarantined_then_deleted_after_grace_period() {
        let (_dir, blobs, manifests) = setup();
        let digest = blobs.put(b"orphan").unwrap();
        let gc = GarbageCollector::new(blobs.clone(), manifests, chrono::Duration::hours(1)).unwrap();

        let t0 = Utc::now();
        let stats1 = gc.run(t0);
        assert_eq!(stats1.quarantined, 1);
        assert_eq!(stats1.deleted, 0);
        assert!(blobs.exists(&digest));

        let t1 = t0 + chrono::Duration::hours(2);
        let stats2 = gc.run(t1);
        assert_eq!(stats2.deleted, 1);
        assert!(!blobs.exists(&digest));
    }

    #[test]
    fn reachable_blob_is_never_quarantined() {
        let (_dir, blobs, manifests) = setup();
        let layer_digest = blobs.put(b"layer-bytes").unwrap();
        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "layers": [{ "digest": layer_digest.as_str() }]
        });
        manifests.put("repo", "latest", manifest.to_string().as_bytes()).unwrap();

        let gc = GarbageCollector::new(blobs.clone(), manifests, chrono::Duration::hours(1)).unwrap();
        let stats = gc.run(Utc::now());
        assert_eq!(stats.quarantined, 0);
        assert!(blobs.exists(&layer_digest));
    }

    #[test]
    fn rereferencing_during_grace_period_rescues_the_blob() {
        let (_dir, blobs, manifests) = setup();
        let digest = blobs.put(b"will-be-saved").unwrap();
        let gc = GarbageCollector::new(blobs.clone(), manifests.clone(), chrono::Duration::hours(1)).unwrap();

        let t0 = Utc::now();
        gc.run(t0);
        assert!(blobs.exists(&digest));

        let manifest = serde_json::json!({ "schemaVersion": 2, "layers": [{ "digest": digest.as_str() }] });
        manifests.put("repo", "latest", manifest.to_string().as_bytes()).unwrap();

        let t1 = t0 + chrono::Duration::hours(2);
        let stats = gc.run(t1);
        assert_eq!(stats.deleted, 0);
        assert!(blobs.exists(&digest));
    }
}
