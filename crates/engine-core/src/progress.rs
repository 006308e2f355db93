use crate::{error::StatusError, state::ReportStore};
use model::{
    core::identifiers::{FarmId, RunId},
    period::ReportPeriod,
    records::{
        job_log::{JobLogEntry, JobStatus, PIPELINE_STAGE},
        report::{EntityReport, ReportDetail},
        run::RunRecord,
    },
};
use serde::Serialize;
use std::sync::Arc;

/// Read-only queries for dashboards and the CLI.
#[derive(Clone)]
pub struct StatusService {
    pub store: Arc<dyn ReportStore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobTotals {
    pub entries: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmFailure {
    pub farm_id: Option<FarmId>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatusView {
    pub run: RunRecord,
    pub jobs: JobTotals,
    /// Pipeline-level failures, one per errored farm attempt.
    pub failures: Vec<FarmFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub report: EntityReport,
    pub details: Vec<ReportDetail>,
}

impl StatusService {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        StatusService { store }
    }

    pub async fn run_status(&self, run_id: RunId) -> Result<RunStatusView, StatusError> {
        let run = self
            .store
            .load_run(run_id)
            .await?
            .ok_or(StatusError::RunNotFound(run_id))?;
        let entries = self.store.job_logs(run_id).await?;

        Ok(RunStatusView {
            run,
            jobs: totals(&entries),
            failures: entries
                .iter()
                .filter(|e| e.stage == PIPELINE_STAGE && e.status == JobStatus::Error)
                .map(|e| FarmFailure {
                    farm_id: e.farm_id,
                    error_code: e.error_code.clone(),
                    error_message: e.error_message.clone(),
                })
                .collect(),
        })
    }

    pub async fn entity_report(
        &self,
        farm: FarmId,
        period: &ReportPeriod,
    ) -> Result<ReportView, StatusError> {
        let report = self
            .store
            .load_report(farm, period)
            .await?
            .ok_or_else(|| StatusError::ReportNotFound {
                farm,
                period: period.key(),
            })?;
        let details = self.store.load_details(report.id).await?;
        Ok(ReportView { report, details })
    }

    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StatusError> {
        Ok(self.store.recent_runs(limit).await?)
    }
}

fn totals(entries: &[JobLogEntry]) -> JobTotals {
    entries.iter().fold(JobTotals::default(), |mut acc, entry| {
        acc.entries += 1;
        match entry.status {
            JobStatus::Running => acc.running += 1,
            JobStatus::Success => acc.succeeded += 1,
            JobStatus::Error => acc.failed += 1,
        }
        acc
    })
}
