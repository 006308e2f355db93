use crate::error::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    core::identifiers::{FarmId, RunId},
    period::ReportPeriod,
    records::{
        job_log::JobLogEntry,
        report::{EntityReport, ReportDetail, ReportFields, ReportStatus},
        run::RunRecord,
    },
};

pub mod sled_store;
pub mod sql_store;

/// Which run counter an entity outcome bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Error,
}

/// Everything written at the terminal transition of one entity pipeline.
/// Stores apply it as a single commit.
#[derive(Debug, Clone)]
pub struct EntityCommit {
    pub report_id: u64,
    pub run_id: RunId,
    pub farm_id: FarmId,
    pub period: ReportPeriod,
    pub status: ReportStatus,
    pub fields: ReportFields,
    pub details: Vec<ReportDetail>,
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
    /// Terminal entries for every stage attempted, in stage order.
    pub stage_jobs: Vec<JobLogEntry>,
    /// The pipeline-level entry opened with `open_job`, now terminal.
    pub pipeline_job: JobLogEntry,
}

/// Persistence of runs, farm reports and the job log.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persists a new run in READY with a fresh, monotonically increasing id.
    async fn create_run(
        &self,
        reference_date: NaiveDate,
        period: ReportPeriod,
    ) -> Result<RunRecord, StoreError>;

    /// Overwrites status, target count and timestamps. Counters are left to
    /// `record_outcome`.
    async fn update_run(&self, run: &RunRecord) -> Result<RunRecord, StoreError>;

    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError>;

    /// Atomically increments one counter of the run and returns the new record.
    async fn record_outcome(&self, id: RunId, outcome: Outcome) -> Result<RunRecord, StoreError>;

    /// Creates the READY report of `farm` for `period` owned by `run_id`,
    /// superseding any report an older or equal run left for the same key.
    /// The share token of a superseded report is carried over.
    async fn open_report(
        &self,
        run_id: RunId,
        farm: FarmId,
        period: &ReportPeriod,
        farm_name: Option<String>,
    ) -> Result<EntityReport, StoreError>;

    /// Appends a RUNNING entry and returns it with its assigned id.
    async fn open_job(&self, entry: JobLogEntry) -> Result<JobLogEntry, StoreError>;

    /// Writes the terminal status of a job opened with `open_job`.
    async fn close_job(&self, entry: &JobLogEntry) -> Result<(), StoreError>;

    async fn commit_entity(&self, commit: EntityCommit) -> Result<(), StoreError>;

    /// The current report for the key, i.e. the one written by the highest run id.
    async fn load_report(
        &self,
        farm: FarmId,
        period: &ReportPeriod,
    ) -> Result<Option<EntityReport>, StoreError>;

    async fn load_details(&self, report_id: u64) -> Result<Vec<ReportDetail>, StoreError>;

    /// All entries of a run, in append order.
    async fn job_logs(&self, run_id: RunId) -> Result<Vec<JobLogEntry>, StoreError>;
}

pub(crate) fn report_key(farm: FarmId, period: &ReportPeriod) -> String {
    format!("{:020}:{}", farm.get(), period.key())
}
