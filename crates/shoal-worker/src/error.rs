use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] shoal_store::StoreError),

    #[error("redfish error: {0}")]
    Redfish(#[from] shoal_redfish::RedfishError),

    #[error("domain error: {0}")]
    Domain(#[from] shoal_domain::DomainError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("internal worker error: {0}")]
    Internal(String),
}
