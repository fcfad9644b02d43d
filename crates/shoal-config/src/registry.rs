use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::{require_var, var_bool_or, var_or, var_parsed_or};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryAuthMode {
    None,
    Basic,
    Htpasswd,
}

impl std::str::FromStr for RegistryAuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(RegistryAuthMode::None),
            "basic" => Ok(RegistryAuthMode::Basic),
            "htpasswd" => Ok(RegistryAuthMode::Htpasswd),
            other => Err(format!("'{other}' is not one of none|basic|htpasswd")),
        }
    }
}

/// Flat, validated registry configuration. Built from `REGISTRY_*` env vars
/// by [`RegistryConfig::from_env`]; `validate` returns the first offending
/// field rather than accumulating a list, matching the teacher's
/// single-error-at-a-time config validation.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub enabled: bool,
    pub storage_root: String,
    pub auth_mode: RegistryAuthMode,
    pub htpasswd_file: Option<String>,
    pub gc_interval: Duration,
    pub gc_grace_period: Duration,
    pub max_concurrent_uploads: u32,
    pub upload_timeout: Duration,
    pub download_timeout: Duration,
    pub enable_audit_log: bool,
    pub audit_log_path: Option<String>,
    pub basic_user: Option<String>,
    pub basic_password: Option<String>,
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_mode: RegistryAuthMode = var_parsed_or("REGISTRY_AUTH_MODE", RegistryAuthMode::None)?;
        let htpasswd_file = match auth_mode {
            RegistryAuthMode::Htpasswd => Some(require_var("REGISTRY_HTPASSWD_FILE")?),
            _ => std::env::var("REGISTRY_HTPASSWD_FILE").ok(),
        };
        let enable_audit_log = var_bool_or("REGISTRY_ENABLE_AUDIT_LOG", false)?;
        let audit_log_path = std::env::var("REGISTRY_AUDIT_LOG_PATH").ok();
        let (basic_user, basic_password) = match auth_mode {
            RegistryAuthMode::Basic => (
                Some(require_var("REGISTRY_BASIC_USER")?),
                Some(require_var("REGISTRY_BASIC_PASSWORD")?),
            ),
            _ => (std::env::var("REGISTRY_BASIC_USER").ok(), std::env::var("REGISTRY_BASIC_PASSWORD").ok()),
        };

        let cfg = RegistryConfig {
            enabled: var_bool_or("ENABLE_REGISTRY", true)?,
            storage_root: var_or("REGISTRY_STORAGE", "/var/lib/shoal/registry"),
            auth_mode,
            htpasswd_file,
            gc_interval: Duration::from_secs(var_parsed_or("REGISTRY_GC_INTERVAL", 3600u64)?),
            gc_grace_period: Duration::from_secs(var_parsed_or("REGISTRY_GC_GRACE_PERIOD", 24 * 3600u64)?),
            max_concurrent_uploads: var_parsed_or("REGISTRY_MAX_CONCURRENT_UPLOADS", 16u32)?,
            upload_timeout: Duration::from_secs(var_parsed_or("REGISTRY_UPLOAD_TIMEOUT", 300u64)?),
            download_timeout: Duration::from_secs(var_parsed_or("REGISTRY_DOWNLOAD_TIMEOUT", 300u64)?),
            enable_audit_log,
            audit_log_path,
            basic_user,
            basic_password,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Returns the first offending field, per spec.md §9's design note.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_root.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_STORAGE".into(),
                message: "must not be empty".into(),
            });
        }
        if self.auth_mode == RegistryAuthMode::Htpasswd && self.htpasswd_file.is_none() {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_HTPASSWD_FILE".into(),
                message: "required when REGISTRY_AUTH_MODE=htpasswd".into(),
            });
        }
        if self.auth_mode == RegistryAuthMode::Basic
            && (self.basic_user.is_none() || self.basic_password.is_none())
        {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_BASIC_USER".into(),
                message: "REGISTRY_BASIC_USER and REGISTRY_BASIC_PASSWORD are required when REGISTRY_AUTH_MODE=basic".into(),
            });
        }
        if self.gc_interval < Duration::from_secs(60) {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_GC_INTERVAL".into(),
                message: "must be at least 1 minute".into(),
            });
        }
        if self.gc_grace_period < Duration::from_secs(3600) {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_GC_GRACE_PERIOD".into(),
                message: "must be at least 1 hour".into(),
            });
        }
        if !(1..=100).contains(&self.max_concurrent_uploads) {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_MAX_CONCURRENT_UPLOADS".into(),
                message: "must be between 1 and 100".into(),
            });
        }
        if self.enable_audit_log && self.audit_log_path.is_none() {
            return Err(ConfigError::Invalid {
                field: "REGISTRY_AUDIT_LOG_PATH".into(),
                message: "required when REGISTRY_ENABLE_AUDIT_LOG=true".into(),
            });
        }
        Ok(())
    }
}
