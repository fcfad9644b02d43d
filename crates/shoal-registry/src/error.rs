use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Registry error kinds. Every variant maps to one of the Distribution v2
/// error codes surfaced in the `{"errors":[{"code","message"}]}` response
/// body (spec.md §4.4/§7).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("blob unknown: {0}")]
    BlobUnknown(String),

    #[error("manifest unknown: {0}")]
    ManifestUnknown(String),

    #[error("name invalid: {0}")]
    NameInvalid(String),

    #[error("tag invalid: {0}")]
    TagInvalid(String),

    #[error("digest invalid: {0}")]
    DigestInvalid(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("upload unknown: {0}")]
    UploadUnknown(String),

    #[error("upload invalid: {0}")]
    UploadInvalid(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// The Distribution v2 error code string for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::BlobUnknown(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestUnknown(_) => "MANIFEST_UNKNOWN",
            RegistryError::NameInvalid(_) => "NAME_INVALID",
            RegistryError::TagInvalid(_) => "TAG_INVALID",
            RegistryError::DigestInvalid(_) => "DIGEST_INVALID",
            RegistryError::DigestMismatch { .. } => "DIGEST_INVALID",
            RegistryError::ManifestInvalid(_) => "MANIFEST_INVALID",
            RegistryError::UploadUnknown(_) => "BLOB_UPLOAD_UNKNOWN",
            RegistryError::UploadInvalid(_) => "BLOB_UPLOAD_INVALID",
            RegistryError::Unsupported(_) => "UNSUPPORTED",
            RegistryError::Unauthorized => "UNAUTHORIZED",
            RegistryError::Io(_) => "UNKNOWN",
            RegistryError::Internal(_) => "UNKNOWN",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::BlobUnknown(_)
            | RegistryError::ManifestUnknown(_)
            | RegistryError::UploadUnknown(_) => StatusCode::NOT_FOUND,
            RegistryError::NameInvalid(_)
            | RegistryError::TagInvalid(_)
            | RegistryError::DigestInvalid(_)
            | RegistryError::DigestMismatch { .. }
            | RegistryError::ManifestInvalid(_)
            | RegistryError::UploadInvalid(_) => StatusCode::BAD_REQUEST,
            RegistryError::Unsupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            RegistryError::Unauthorized => StatusCode::UNAUTHORIZED,
            RegistryError::Io(_) | RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        // UNAUTHORIZED never discloses why — spec.md §4.4.
        let message = match &self {
            RegistryError::Unauthorized => "authentication required".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({ "errors": [{ "code": self.code(), "message": message }] }));
        (self.status(), body).into_response()
    }
}
