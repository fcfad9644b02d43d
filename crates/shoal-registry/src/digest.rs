use sha2::{Digest as _, Sha256};

use crate::error::RegistryError;

/// A validated `sha256:<64-hex>` content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    pub fn of(bytes: &[u8]) -> Self {
        let hex = hex::encode(Sha256::digest(bytes));
        Digest(format!("sha256:{hex}"))
    }

    /// Finalizes an incremental hasher into a digest, for callers that
    /// streamed content through it chunk by chunk instead of hashing a
    /// fully-buffered slice.
    pub fn from_hasher(hasher: Sha256) -> Self {
        let hex = hex::encode(hasher.finalize());
        Digest(format!("sha256:{hex}"))
    }

    /// Parses and validates `s` as `sha256:<64-hex>`.
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let Some(hex_part) = s.strip_prefix("sha256:") else {
            return Err(RegistryError::DigestInvalid(s.to_string()));
        };
        if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RegistryError::DigestInvalid(s.to_string()));
        }
        Ok(Digest(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare 64-hex portion, used as the on-disk blob filename.
    pub fn hex(&self) -> &str {
        self.0.strip_prefix("sha256:").expect("constructed with sha256: prefix")
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates a repository name: one or more `[^/]+` segments joined by `/`.
pub fn validate_repo_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.split('/').any(|seg| seg.is_empty()) {
        return Err(RegistryError::NameInvalid(name.to_string()));
    }
    Ok(())
}

/// Validates a tag name per spec.md §3: not empty, no `/`, no `..`.
pub fn validate_tag(tag: &str) -> Result<(), RegistryError> {
    if tag.is_empty() || tag.contains('/') || tag.contains("..") {
        return Err(RegistryError::TagInvalid(tag.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_matches_known_sha256() {
        let d = Digest::of(b"");
        assert_eq!(
            d.as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Digest::parse("sha256:abc").is_err());
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!(Digest::parse("abcd").is_err());
    }

    #[test]
    fn tag_validation_rejects_slash_and_dotdot() {
        assert!(validate_tag("v1/x").is_err());
        assert!(validate_tag("..").is_err());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("latest").is_ok());
    }

    #[test]
    fn repo_name_rejects_empty_segments() {
        assert!(validate_repo_name("a//b").is_err());
        assert!(validate_repo_name("").is_err());
        assert!(validate_repo_name("a/b").is_ok());
    }
}
