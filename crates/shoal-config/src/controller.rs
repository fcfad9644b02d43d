use crate::error::ConfigError;

/// Configuration for the main controller binary (`shoald`). CLI flags
/// (`--port`, `--db`, `--log-level`, `--encryption-key`) take precedence
/// over the matching env var when both are set; `shoal-cli` is responsible
/// for wiring clap's parsed flags in via [`ControllerConfig::apply_overrides`].
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub port: u16,
    pub db_url: String,
    pub log_level: String,
    /// Opaque key used by (out-of-core-scope) encryption-at-rest for BMC
    /// credentials; this crate only validates its presence/shape.
    pub encryption_key: String,
    /// Opaque admin-UI password; out-of-core-scope consumer, validated here
    /// only for presence.
    pub admin_password: Option<String>,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = ControllerConfig {
            port: std::env::var("SHOAL_PORT")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|e| ConfigError::Invalid {
                    field: "SHOAL_PORT".into(),
                    message: format!("{e}"),
                })?
                .unwrap_or(8080),
            db_url: std::env::var("SHOAL_DB").unwrap_or_else(|_| "postgres://localhost/shoal".to_string()),
            log_level: std::env::var("SHOAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            encryption_key: std::env::var("SHOAL_ENCRYPTION_KEY")
                .map_err(|_| ConfigError::MissingVar("SHOAL_ENCRYPTION_KEY".into()))?,
            admin_password: std::env::var("SHOAL_ADMIN_PASSWORD").ok(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies CLI-flag overrides on top of env-sourced defaults. `None`
    /// leaves the field untouched.
    pub fn apply_overrides(
        mut self,
        port: Option<u16>,
        db: Option<String>,
        log_level: Option<String>,
        encryption_key: Option<String>,
    ) -> Self {
        if let Some(p) = port {
            self.port = p;
        }
        if let Some(db) = db {
            self.db_url = db;
        }
        if let Some(level) = log_level {
            self.log_level = level;
        }
        if let Some(key) = encryption_key {
            self.encryption_key = key;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encryption_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "SHOAL_ENCRYPTION_KEY".into(),
                message: "must not be empty".into(),
            });
        }
        if self.db_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "SHOAL_DB".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
