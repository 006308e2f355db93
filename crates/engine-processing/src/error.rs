use engine_core::error::StoreError;
use model::core::identifiers::FarmId;
use thiserror::Error;

/// The window table could not be read. Fatal for the run.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Failed to read service windows: {0}")]
    Source(String),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Data unavailable for farm {farm}: {reason}")]
    DataUnavailable { farm: FarmId, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: &str, message: impl Into<String>) -> Self {
        StageError {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
#[error("Failed to persist results of farm {farm}: {source}")]
pub struct PersistenceError {
    pub farm: FarmId,
    #[source]
    pub source: StoreError,
}

/// Everything that can turn one farm's outcome into ERROR. None of these
/// leave the pipeline boundary except as a recorded outcome.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Farm {farm} timed out after {secs}s")]
    Timeout { farm: FarmId, secs: u64 },

    #[error("Farm {0} was not dispatched because the run was cancelled")]
    Cancelled(FarmId),
}

impl PipelineError {
    /// Stable code written to the job log.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Snapshot(_) => "DATA_UNAVAILABLE",
            PipelineError::Stage(_) => "STAGE_FAILED",
            PipelineError::Persistence(_) => "PERSISTENCE",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::Cancelled(_) => "CANCELLED",
        }
    }

    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::Stage(e) => Some(&e.stage),
            _ => None,
        }
    }
}
