use crate::core::identifiers::{FarmId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on persisted error messages, in characters.
pub const MAX_ERROR_MESSAGE_LEN: usize = 2000;

/// Stage name used for the entry that spans a whole farm pipeline.
pub const PIPELINE_STAGE: &str = "pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(JobStatus::Running),
            "SUCCESS" => Some(JobStatus::Success),
            "ERROR" => Some(JobStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only execution record of one pipeline or stage attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: u64,
    pub run_id: RunId,
    pub farm_id: Option<FarmId>,
    pub stage: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<u64>,
    pub processed_count: u64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl JobLogEntry {
    /// A fresh RUNNING entry; `id` is assigned by the store.
    pub fn running(run_id: RunId, farm_id: Option<FarmId>, stage: &str) -> Self {
        JobLogEntry {
            id: 0,
            run_id,
            farm_id,
            stage: stage.to_string(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            elapsed_ms: None,
            processed_count: 0,
            error_code: None,
            error_message: None,
        }
    }

    pub fn succeed(mut self, processed_count: u64) -> Self {
        self.close(JobStatus::Success);
        self.processed_count = processed_count;
        self
    }

    pub fn fail(mut self, code: &str, message: &str) -> Self {
        self.close(JobStatus::Error);
        self.error_code = Some(code.to_string());
        self.error_message = Some(truncate_message(message, MAX_ERROR_MESSAGE_LEN));
        self
    }

    fn close(&mut self, status: JobStatus) {
        let now = Utc::now();
        self.status = status;
        self.ended_at = Some(now);
        self.elapsed_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}

/// Truncates on a char boundary.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
