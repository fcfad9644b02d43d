use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
