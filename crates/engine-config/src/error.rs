use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating engine settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Malformed `.env` file or an override that does not parse.
    #[error("Environment error: {0}")]
    Env(String),

    #[error("Invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
