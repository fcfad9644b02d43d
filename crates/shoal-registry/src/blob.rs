use std::path::{Path, PathBuf};
use std::sync::Mutex;

use shoal_domain::atomic::write_atomic;

use crate::digest::Digest;
use crate::error::RegistryError;

/// Content-addressed blob store rooted at `<root>/blobs/sha256/<64-hex>`.
///
/// Writes are serialised by a single mutex (spec.md §5: "blob writes are
/// serialised by the storage mutex; readers do not block writers of *other*
/// blobs" — reads bypass the mutex entirely since the filesystem already
/// gives us atomic-rename durability).
pub struct BlobStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("blobs/sha256"))?;
        let marker = root.join("oci-layout");
        if !marker.exists() {
            write_atomic(&marker, br#"{"imageLayoutVersion":"1.0.0"}"#)?;
        }
        Ok(BlobStore { root, write_lock: Mutex::new(()) })
    }

    pub fn path_for(&self, digest: &Digest) -> PathBuf {
        self.root.join("blobs/sha256").join(digest.hex())
    }

    pub fn exists(&self, digest: &Digest) -> bool {
        self.path_for(digest).is_file()
    }

    pub fn size_of(&self, digest: &Digest) -> Result<u64, RegistryError> {
        Ok(std::fs::metadata(self.path_for(digest))?.len())
    }

    pub fn read(&self, digest: &Digest) -> Result<Vec<u8>, RegistryError> {
        std::fs::read(self.path_for(digest)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegistryError::BlobUnknown(digest.to_string())
            } else {
                RegistryError::Io(e)
            }
        })
    }

    /// Writes `bytes` under its own digest. A no-op if the blob already
    /// exists (content-addressed dedup). Returns the digest.
    pub fn put(&self, bytes: &[u8]) -> Result<Digest, RegistryError> {
        let digest = Digest::of(bytes);
        let _guard = self.write_lock.lock().unwrap();
        let path = self.path_for(&digest);
        if !path.is_file() {
            write_atomic(&path, bytes)?;
        }
        Ok(digest)
    }

    /// Moves an already-hashed temp file into place under `digest` via a
    /// same-filesystem rename, skipping the read-whole-file-then-write path
    /// [`BlobStore::put`] uses for small in-memory content. A no-op rename
    /// (the temp file is simply discarded) if the blob already exists.
    pub fn adopt_temp_file(&self, temp_path: &Path, digest: &Digest) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().unwrap();
        let dest = self.path_for(digest);
        if dest.is_file() {
            let _ = std::fs::remove_file(temp_path);
            return Ok(());
        }
        std::fs::rename(temp_path, &dest)?;
        Ok(())
    }

    /// Removes a blob file. Tolerant of the file already being gone.
    pub fn remove(&self, digest: &Digest) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().unwrap();
        match std::fs::remove_file(self.path_for(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    /// Lists every digest currently on disk, for GC's reachability sweep.
    pub fn list_digests(&self) -> Result<Vec<Digest>, RegistryError> {
        let dir = self.root.join("blobs/sha256");
        let mut digests = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(digest) = Digest::parse(&format!("sha256:{name}")) {
                    digests.push(digest);
                }
            }
        }
        Ok(digests)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent_and_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let d1 = store.put(b"hello").unwrap();
        let d2 = store.put(b"hello").unwrap();
        assert_eq!(d1, d2);
        assert_eq!(store.read(&d1).unwrap(), b"hello");
    }

    #[test]
    fn oci_layout_marker_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let _store = BlobStore::new(dir.path()).unwrap();
        let marker = std::fs::read_to_string(dir.path().join("oci-layout")).unwrap();
        assert!(marker.contains("1.0.0"));
    }

    #[test]
    fn read_missing_blob_is_blob_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let digest = Digest::of(b"nope");
        assert!(matches!(store.read(&digest), Err(RegistryError::BlobUnknown(_))));
    }

    #[test]
    fn adopt_temp_file_moves_file_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let temp_path = dir.path().join("scratch");
        std::fs::write(&temp_path, b"hello").unwrap();
        let digest = Digest::of(b"hello");
        store.adopt_temp_file(&temp_path, &digest).unwrap();
        assert!(!temp_path.exists());
        assert_eq!(store.read(&digest).unwrap(), b"hello");
    }

    #[test]
    fn adopt_temp_file_discards_duplicate_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        store.put(b"hello").unwrap();
        let temp_path = dir.path().join("scratch");
        std::fs::write(&temp_path, b"hello").unwrap();
        let digest = Digest::of(b"hello");
        store.adopt_temp_file(&temp_path, &digest).unwrap();
        assert!(!temp_path.exists());
    }

    #[test]
    fn remove_is_tolerant_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let digest = Digest::of(b"nope");
        assert!(store.remove(&digest).is_ok());
    }
}
