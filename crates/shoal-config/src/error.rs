use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(String),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recipe schema is not valid JSON: {0}")]
    SchemaParse(#[from] serde_json::Error),

    #[error("recipe schema failed to compile: {0}")]
    SchemaCompile(String),
}
