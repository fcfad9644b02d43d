use std::sync::Arc;

use serde_json::Value;

use crate::blob::BlobStore;
use crate::digest::{validate_repo_name, validate_tag, Digest};
use crate::error::RegistryError;
use crate::tag::TagStore;

/// Manifest and tag operations layered on a [`BlobStore`]. A manifest is
/// itself stored as a blob keyed by its own digest (spec.md §3); tags are
/// separate (repo, name) -> digest pointers.
pub struct ManifestStore {
    blobs: Arc<BlobStore>,
    tags: TagStore,
}

impl ManifestStore {
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        let tags = TagStore::new(blobs.root().to_path_buf());
        ManifestStore { blobs, tags }
    }

    /// Parses minimally (valid JSON, `schemaVersion != 0`), stores the bytes
    /// as a blob, and — if `reference` is not itself a digest — writes the
    /// tag pointing at the resulting digest. Returns the digest.
    pub fn put(&self, repo: &str, reference: &str, bytes: &[u8]) -> Result<Digest, RegistryError> {
        validate_repo_name(repo)?;
        let parsed: Value = serde_json::from_slice(bytes)
            .map_err(|e| RegistryError::ManifestInvalid(e.to_string()))?;
        let schema_version = parsed.get("schemaVersion").and_then(Value::as_i64).unwrap_or(0);
        if schema_version == 0 {
            return Err(RegistryError::ManifestInvalid("schemaVersion must be non-zero".into()));
        }

        let digest = self.blobs.put(bytes)?;

        if Digest::parse(reference).is_err() {
            validate_tag(reference)?;
            self.tags.set(repo, reference, &digest)?;
        }

        Ok(digest)
    }

    /// Reads a manifest. If `reference` parses as a digest, reads the blob
    /// directly; otherwise resolves the tag first.
    pub fn get(&self, repo: &str, reference: &str) -> Result<(Vec<u8>, Digest), RegistryError> {
        validate_repo_name(repo)?;
        let digest = self.resolve(repo, reference)?;
        let bytes = self.blobs.read(&digest)?;
        Ok((bytes, digest))
    }

    /// Tag-aware existence check: a missing tag is `false`, not an error.
    pub fn exists(&self, repo: &str, reference: &str) -> Result<bool, RegistryError> {
        validate_repo_name(repo)?;
        match self.resolve(repo, reference) {
            Ok(digest) => Ok(self.blobs.exists(&digest)),
            Err(RegistryError::ManifestUnknown(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes a tag. Deletion by digest is not implemented — the manifest
    /// blob itself is only ever removed by garbage collection — so a
    /// digest-shaped `tag` is rejected rather than silently treated as a
    /// literal tag name.
    pub fn delete_tag(&self, repo: &str, tag: &str) -> Result<(), RegistryError> {
        validate_repo_name(repo)?;
        if Digest::parse(tag).is_ok() {
            return Err(RegistryError::Unsupported("delete by digest is not supported".into()));
        }
        validate_tag(tag)?;
        self.tags.delete(repo, tag)
    }

    fn resolve(&self, repo: &str, reference: &str) -> Result<Digest, RegistryError> {
        if let Ok(digest) = Digest::parse(reference) {
            return Ok(digest);
        }
        validate_tag(reference)?;
        self.tags
            .get(repo, reference)?
            .ok_or_else(|| RegistryError::ManifestUnknown(format!("{repo}:{reference}")))
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ManifestStore) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(BlobStore::new(dir.path()).unwrap());
        (dir, ManifestStore::new(blobs))
    }

    #[test]
    fn put_by_tag_then_get_by_tag_and_digest() {
        let (_dir, store) = store();
        let manifest = br#"{"schemaVersion":2,"layers":[]}"#;
        let digest = store.put("test/repo", "latest", manifest).unwrap();

        let (bytes, got_digest) = store.get("test/repo", "latest").unwrap();
        assert_eq!(bytes, manifest);
        assert_eq!(got_digest, digest);

        let (bytes2, _) = store.get("test/repo", digest.as_str()).unwrap();
        assert_eq!(bytes2, manifest);
    }

    #[test]
    fn rejects_zero_schema_version() {
        let (_dir, store) = store();
        let err = store.put("test/repo", "latest", br#"{"schemaVersion":0}"#).unwrap_err();
        assert!(matches!(err, RegistryError::ManifestInvalid(_)));
    }

    #[test]
    fn missing_tag_returns_manifest_unknown_not_error_on_exists() {
        let (_dir, store) = store();
        assert!(!store.exists("test/repo", "missing").unwrap());
        assert!(matches!(store.get("test/repo", "missing"), Err(RegistryError::ManifestUnknown(_))));
    }

    #[test]
    fn delete_tag_removes_resolution() {
        let (_dir, store) = store();
        store.put("test/repo", "latest", br#"{"schemaVersion":2}"#).unwrap();
        store.delete_tag("test/repo", "latest").unwrap();
        assert!(!store.exists("test/repo", "latest").unwrap());
    }

    #[test]
    fn delete_tag_rejects_digest_reference() {
        let (_dir, store) = store();
        let digest = store.put("test/repo", "latest", br#"{"schemaVersion":2}"#).unwrap();
        let err = store.delete_tag("test/repo", digest.as_str()).unwrap_err();
        assert!(matches!(err, RegistryError::Unsupported(_)));
        assert!(store.exists("test/repo", "latest").unwrap());
    }
}
