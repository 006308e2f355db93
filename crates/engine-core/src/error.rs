use connectors::error::DbError;
use model::core::identifiers::{FarmId, RunId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },

    #[error("Failed to decode {what}: {message}")]
    Decode { what: &'static str, message: String },

    #[error("Run {0} not found")]
    RunNotFound(RunId),

    #[error("Report {0} not found")]
    ReportNotFound(u64),

    /// A newer run already owns the report for this farm and period.
    #[error("Report for farm {farm} period {period} belongs to newer {newer}")]
    Superseded {
        farm: FarmId,
        period: String,
        newer: RunId,
    },

    #[error("Job log entry {0} not found")]
    JobNotFound(u64),

    #[error("Job log entry {0} is already terminal")]
    JobClosed(u64),
}

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Run {0} not found")]
    RunNotFound(RunId),

    #[error("No report for farm {farm} in period {period}")]
    ReportNotFound { farm: FarmId, period: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
