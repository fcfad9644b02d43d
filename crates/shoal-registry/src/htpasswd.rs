use std::collections::HashMap;

use crate::error::RegistryError;

/// Username -> bcrypt hash, loaded once at startup from an htpasswd-style
/// file. Only bcrypt (`$2a$`/`$2b$`/`$2y$`) hashes are accepted; any other
/// algorithm in the file is a startup failure (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct Htpasswd {
    entries: HashMap<String, String>,
}

impl Htpasswd {
    pub fn load(path: &str) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        let mut entries = HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (user, hash) = line.split_once(':').ok_or_else(|| {
                RegistryError::Internal(format!("{path}:{}: malformed htpasswd line", lineno + 1))
            })?;
            if !is_bcrypt_hash(hash) {
                return Err(RegistryError::Internal(format!(
                    "{path}:{}: only bcrypt ($2a$/$2b$/$2y$) hashes are supported",
                    lineno + 1
                )));
            }
            entries.insert(user.to_string(), hash.to_string());
        }
        Ok(Htpasswd { entries })
    }

    /// Verifies `user`/`password` against the loaded table. Never discloses
    /// whether the user exists — a missing user always fails the same way
    /// as a wrong password.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        match self.entries.get(user) {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => false,
        }
    }
}

fn is_bcrypt_hash(hash: &str) -> bool {
    hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_verifies_bcrypt_entry() {
        let hash = bcrypt::hash("s3cret", bcrypt::DEFAULT_COST).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("htpasswd");
        std::fs::write(&path, format!("alice:{hash}\n")).unwrap();

        let store = Htpasswd::load(path.to_str().unwrap()).unwrap();
        assert!(store.verify("alice", "s3cret"));
        assert!(!store.verify("alice", "wrong"));
        assert!(!store.verify("bob", "s3cret"));
    }

    #[test]
    fn rejects_non_bcrypt_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("htpasswd");
        std::fs::write(&path, "alice:$apr1$abc$def\n").unwrap();
        assert!(Htpasswd::load(path.to_str().unwrap()).is_err());
    }
}
