use engine_config::error::SettingsError;
use engine_core::error::{StatusError, StoreError};
use engine_runtime::error::BatchError;
use model::period::PeriodError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Run failed: {0}")]
    Batch(#[from] BatchError),

    #[error("Report store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Status(#[from] StatusError),

    #[error("Invalid period: {0}")]
    Period(#[from] PeriodError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
