use crate::{
    core::identifiers::RunId,
    period::{PeriodKind, ReportPeriod},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Ready,
    Running,
    Complete,
    /// Finished, but at least one farm errored.
    Error,
    /// Stopped before every farm was dispatched.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ready => "READY",
            RunStatus::Running => "RUNNING",
            RunStatus::Complete => "COMPLETE",
            RunStatus::Error => "ERROR",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(RunStatus::Ready),
            "RUNNING" => Some(RunStatus::Running),
            "COMPLETE" => Some(RunStatus::Complete),
            "ERROR" => Some(RunStatus::Error),
            "CANCELLED" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Complete | RunStatus::Error | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub kind: PeriodKind,
    pub reference_date: NaiveDate,
    pub period: ReportPeriod,
    pub status: RunStatus,
    pub target_count: u64,
    pub complete_count: u64,
    pub error_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(id: RunId, reference_date: NaiveDate, period: ReportPeriod) -> Self {
        RunRecord {
            id,
            kind: period.kind,
            reference_date,
            period,
            status: RunStatus::Ready,
            target_count: 0,
            complete_count: 0,
            error_count: 0,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn finished_count(&self) -> u64 {
        self.complete_count + self.error_count
    }

    pub fn is_balanced(&self) -> bool {
        self.target_count == self.finished_count()
    }

    pub fn elapsed_secs(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}
