use std::str::FromStr;

use crate::error::ConfigError;

/// Reads `key`, falling back to `default` if unset. Mirrors the
/// env-first-then-default pattern used throughout the controller/registry
/// config loaders.
pub fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Reads and parses `key`, falling back to `default` if unset.
pub fn var_parsed_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            field: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Reads a boolean env var. Accepts `1/0`, `true/false`, `yes/no`
/// case-insensitively; falls back to `default` if unset.
pub fn var_bool_or(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                field: key.to_string(),
                message: format!("'{other}' is not a recognized boolean"),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Reads a required env var, erroring if unset.
pub fn require_var(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}
