use std::path::PathBuf;

use shoal_domain::atomic::write_atomic;

use crate::digest::Digest;
use crate::error::RegistryError;

/// Tag files: `<root>/repositories/<name>/refs/<tag>` containing a single
/// digest string.
pub struct TagStore {
    root: PathBuf,
}

impl TagStore {
    pub fn new(root: PathBuf) -> Self {
        TagStore { root }
    }

    fn path(&self, repo: &str, tag: &str) -> PathBuf {
        self.root.join("repositories").join(repo).join("refs").join(tag)
    }

    pub fn set(&self, repo: &str, tag: &str, digest: &Digest) -> Result<(), RegistryError> {
        let path = self.path(repo, tag);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        write_atomic(&path, digest.as_str().as_bytes())?;
        Ok(())
    }

    pub fn get(&self, repo: &str, tag: &str) -> Result<Option<Digest>, RegistryError> {
        match std::fs::read_to_string(self.path(repo, tag)) {
            Ok(s) => Ok(Some(Digest::parse(s.trim())?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    pub fn delete(&self, repo: &str, tag: &str) -> Result<(), RegistryError> {
        match std::fs::remove_file(self.path(repo, tag)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    /// Lists every digest currently referenced by any tag in any
    /// repository, for GC's reachability trace.
    pub fn list_all_digests(&self) -> Result<Vec<Digest>, RegistryError> {
        let mut out = Vec::new();
        let repos_dir = self.root.join("repositories");
        if !repos_dir.is_dir() {
            return Ok(out);
        }
        let mut stack = vec![repos_dir];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().and_then(|n| n.to_str()) == Some("refs") {
                        for tag_entry in std::fs::read_dir(&path)? {
                            let tag_entry = tag_entry?;
                            if let Ok(s) = std::fs::read_to_string(tag_entry.path()) {
                                if let Ok(digest) = Digest::parse(s.trim()) {
                                    out.push(digest);
                                }
                            }
                        }
                    } else {
                        stack.push(path);
                    }
                }
            }
        }
        Ok(out)
    }
}
