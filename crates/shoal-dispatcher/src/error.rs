use thiserror::Error;

/// Dispatcher failure kinds, each carrying the stable exit code from
/// spec.md §4.7's numeric contract. The dispatcher binary is the only
/// consumer of [`DispatchError::exit_code`] — everything else just
/// propagates the error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("timed out waiting for task device {0}")]
    DeviceTimeout(String),

    #[error("failed to mount task device: {0}")]
    MountFailure(String),

    #[error("recipe schema error: {0}")]
    SchemaError(String),

    #[error("failed to read recipe: {0}")]
    RecipeReadError(String),

    #[error("recipe failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("failed to write dispatcher output: {0}")]
    OutputError(String),

    #[error("systemd start failed: {0}")]
    SystemdError(String),

    #[error("insufficient privilege: {0}")]
    PrivilegeError(String),

    #[error("serial resolution error: {0}")]
    SerialError(String),

    #[error("unexpected dispatcher error: {0}")]
    Unexpected(String),
}

impl DispatchError {
    /// The stable numeric exit code for this error kind (spec.md §4.7).
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::DeviceTimeout(_) => 10,
            DispatchError::MountFailure(_) => 11,
            DispatchError::SchemaError(_) => 12,
            DispatchError::RecipeReadError(_) => 13,
            DispatchError::SchemaInvalid(_) => 14,
            DispatchError::OutputError(_) => 15,
            DispatchError::SystemdError(_) => 16,
            DispatchError::PrivilegeError(_) => 17,
            DispatchError::SerialError(_) => 18,
            DispatchError::Unexpected(_) => 20,
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(e: std::io::Error) -> Self {
        DispatchError::OutputError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_stable_contract() {
        assert_eq!(DispatchError::DeviceTimeout("x".into()).exit_code(), 10);
        assert_eq!(DispatchError::MountFailure("x".into()).exit_code(), 11);
        assert_eq!(DispatchError::SchemaError("x".into()).exit_code(), 12);
        assert_eq!(DispatchError::RecipeReadError("x".into()).exit_code(), 13);
        assert_eq!(DispatchError::SchemaInvalid("x".into()).exit_code(), 14);
        assert_eq!(DispatchError::OutputError("x".into()).exit_code(), 15);
        assert_eq!(DispatchError::SystemdError("x".into()).exit_code(), 16);
        assert_eq!(DispatchError::PrivilegeError("x".into()).exit_code(), 17);
        assert_eq!(DispatchError::SerialError("x".into()).exit_code(), 18);
        assert_eq!(DispatchError::Unexpected("x".into()).exit_code(), 20);
    }
}
