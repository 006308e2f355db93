use crate::{
    core::{
        identifiers::{FarmId, RunId},
        value::Value,
    },
    period::ReportPeriod,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Summary columns of a farm report, filled in by the stages.
pub type ReportFields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Ready,
    Complete,
    Error,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Ready => "READY",
            ReportStatus::Complete => "COMPLETE",
            ReportStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(ReportStatus::Ready),
            "COMPLETE" => Some(ReportStatus::Complete),
            "ERROR" => Some(ReportStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The report of one farm for one period, produced by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub id: u64,
    pub run_id: RunId,
    pub farm_id: FarmId,
    pub period: ReportPeriod,
    pub status: ReportStatus,
    pub share_token: String,
    pub farm_name: Option<String>,
    pub fields: ReportFields,
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityReport {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A structured row emitted by a stage. The payload schema belongs to the stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDetail {
    pub stage: String,
    pub kind: String,
    pub sort_no: u32,
    pub payload: serde_json::Value,
}

impl ReportDetail {
    pub fn new(stage: &str, kind: &str, sort_no: u32, payload: serde_json::Value) -> Self {
        ReportDetail {
            stage: stage.to_string(),
            kind: kind.to_string(),
            sort_no,
            payload,
        }
    }
}
