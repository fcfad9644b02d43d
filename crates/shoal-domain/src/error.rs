use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("invalid server serial: {0}")]
    InvalidSerial(String),

    #[error("payload field uses a reserved representation (url/path) not yet supported")]
    ReservedPayloadField,

    #[error("invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
