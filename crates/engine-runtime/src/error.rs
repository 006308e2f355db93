use connectors::error::{ConnectorError, DbError};
use engine_config::error::SettingsError;
use engine_core::error::StoreError;
use engine_processing::error::SelectionError;
use model::core::identifiers::RunId;
use thiserror::Error;

/// Run-fatal errors. Farm-level failures never surface here; they are
/// recorded on the farm's report and counted on the run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Report store error: {0}")]
    Store(#[from] StoreError),

    #[error("Farm selection failed: {0}")]
    Selection(#[from] SelectionError),

    /// The outcome collector died before every farm was accounted for.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Finalized counters do not add up. Always a defect.
    #[error("Run {run} counters are inconsistent: target {target} != complete {complete} + error {error}")]
    CounterConsistency {
        run: RunId,
        target: u64,
        complete: u64,
        error: u64,
    },
}

/// Failure of one upstream collector. Logged, never run-fatal.
#[derive(Debug, Error)]
#[error("Collector '{name}' failed: {message}")]
pub struct CollectorError {
    pub name: String,
    pub message: String,
}

impl CollectorError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        CollectorError {
            name: name.into(),
            message: message.into(),
        }
    }
}
