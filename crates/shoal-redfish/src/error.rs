use thiserror::Error;

/// Errors from a single Redfish call. [`crate::retry::retry`] uses
/// [`RedfishError::is_retryable`] to decide whether to try again.
#[derive(Debug, Error)]
pub enum RedfishError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("authentication failed")]
    Auth,

    #[error("operation cancelled")]
    Cancelled,

    #[error("unexpected redfish response: {0}")]
    Unexpected(String),
}

impl RedfishError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RedfishError::Timeout | RedfishError::Transport(_) => true,
            RedfishError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            RedfishError::Auth | RedfishError::Cancelled | RedfishError::Unexpected(_) => false,
        }
    }

    pub fn status_label(&self) -> String {
        match self {
            RedfishError::Http { status, .. } => status.to_string(),
            RedfishError::Timeout => "timeout".to_string(),
            RedfishError::Transport(_) => "transport_error".to_string(),
            RedfishError::Auth => "auth_error".to_string(),
            RedfishError::Cancelled => "cancelled".to_string(),
            RedfishError::Unexpected(_) => "unexpected".to_string(),
        }
    }
}
