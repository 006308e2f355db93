use crate::{
    error::StoreError,
    state::{EntityCommit, Outcome, ReportStore, report_key},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use model::{
    core::identifiers::{FarmId, RunId},
    period::ReportPeriod,
    records::{
        job_log::JobLogEntry,
        report::{EntityReport, ReportDetail, ReportFields, ReportStatus},
        run::RunRecord,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use sled::{
    Transactional,
    transaction::{ConflictableTransactionError, TransactionError},
};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Local embedded store. Runs and job entries are bincode encoded; reports
/// and details carry JSON payloads and are stored as JSON.
pub struct SledReportStore {
    db: sled::Db,
    seq: sled::Tree,
    runs: sled::Tree,
    reports: sled::Tree,
    details: sled::Tree,
    jobs: sled::Tree,
}

type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

impl SledReportStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// Store backed by a temporary directory removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(SledReportStore {
            seq: db.open_tree("seq")?,
            runs: db.open_tree("runs")?,
            reports: db.open_tree("reports")?,
            details: db.open_tree("details")?,
            jobs: db.open_tree("jobs")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Consecutive ids per sequence name, starting at 1.
    fn next_seq(&self, name: &str) -> Result<u64, StoreError> {
        let bytes = self
            .seq
            .update_and_fetch(name, increment)?
            .ok_or_else(|| StoreError::Decode {
                what: "sequence",
                message: format!("sequence '{name}' vanished"),
            })?;
        Ok(read_u64(&bytes))
    }
}

fn increment(old: Option<&[u8]>) -> Option<Vec<u8>> {
    let next = old.map(read_u64).unwrap_or(0) + 1;
    Some(next.to_be_bytes().to_vec())
}

fn read_u64(bytes: &[u8]) -> u64 {
    let array: [u8; 8] = bytes.try_into().unwrap_or([0; 8]);
    u64::from_be_bytes(array)
}

#[inline]
fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

#[inline]
fn job_key(run_id: RunId, job_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&run_id.get().to_be_bytes());
    key.extend_from_slice(&job_id.to_be_bytes());
    key
}

fn encode_bin<T: Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encode {
        what,
        message: e.to_string(),
    })
}

fn decode_bin<T: DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Decode {
        what,
        message: e.to_string(),
    })
}

fn encode_json<T: Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Encode {
        what,
        message: e.to_string(),
    })
}

fn decode_json<T: DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Decode {
        what,
        message: e.to_string(),
    })
}

fn abort<T>(err: StoreError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

fn finish<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
    }
}

#[async_trait]
impl ReportStore for SledReportStore {
    async fn create_run(
        &self,
        reference_date: NaiveDate,
        period: ReportPeriod,
    ) -> Result<RunRecord, StoreError> {
        let id = RunId(self.next_seq("run")?);
        let run = RunRecord::new(id, reference_date, period);
        self.runs.insert(id_key(id.get()), encode_bin("run", &run)?)?;
        debug!(run_id = %id, "Run record created");
        Ok(run)
    }

    async fn update_run(&self, run: &RunRecord) -> Result<RunRecord, StoreError> {
        let key = id_key(run.id.get());
        let result = self.runs.transaction(|tx| {
            let Some(bytes) = tx.get(&key)? else {
                return abort(StoreError::RunNotFound(run.id));
            };
            let mut stored: RunRecord =
                decode_bin("run", &bytes).map_err(ConflictableTransactionError::Abort)?;
            stored.status = run.status;
            stored.target_count = run.target_count;
            stored.started_at = run.started_at;
            stored.ended_at = run.ended_at;

            let encoded = encode_bin("run", &stored).map_err(ConflictableTransactionError::Abort)?;
            tx.insert(key.as_slice(), encoded)?;
            Ok(stored)
        });
        finish(result)
    }

    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>, StoreError> {
        match self.runs.get(id_key(id.get()))? {
            Some(bytes) => Ok(Some(decode_bin("run", &bytes)?)),
            None => Ok(None),
        }
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let mut runs = Vec::new();
        for item in self.runs.iter().rev().take(limit) {
            let (_key, value) = item?;
            runs.push(decode_bin("run", &value)?);
        }
        Ok(runs)
    }

    async fn record_outcome(&self, id: RunId, outcome: Outcome) -> Result<RunRecord, StoreError> {
        let key = id_key(id.get());
        // Sled retries the closure on conflict, so concurrent increments never get lost.
        let result = self.runs.transaction(|tx| {
            let Some(bytes) = tx.get(&key)? else {
                return abort(StoreError::RunNotFound(id));
            };
            let mut run: RunRecord =
                decode_bin("run", &bytes).map_err(ConflictableTransactionError::Abort)?;
            match outcome {
                Outcome::Complete => run.complete_count += 1,
                Outcome::Error => run.error_count += 1,
            }
            let encoded = encode_bin("run", &run).map_err(ConflictableTransactionError::Abort)?;
            tx.insert(key.as_slice(), encoded)?;
            Ok(run)
        });
        finish(result)
    }

    async fn open_report(
        &self,
        run_id: RunId,
        farm: FarmId,
        period: &ReportPeriod,
        farm_name: Option<String>,
    ) -> Result<EntityReport, StoreError> {
        let key = report_key(farm, period);
        let report_id = self.next_seq("report")?;
        let fresh_token = Uuid::new_v4().to_string();
        let now = Utc::now();

        let result = (&self.reports, &self.details).transaction(|(reports, details)| {
            let existing: Option<EntityReport> = match reports.get(key.as_bytes())? {
                Some(bytes) => {
                    Some(decode_json("report", &bytes).map_err(ConflictableTransactionError::Abort)?)
                }
                None => None,
            };

            if let Some(prev) = &existing {
                if prev.run_id > run_id {
                    return abort(StoreError::Superseded {
                        farm,
                        period: period.key(),
                        newer: prev.run_id,
                    });
                }
                details.remove(id_key(prev.id))?;
            }

            let report = EntityReport {
                id: report_id,
                run_id,
                farm_id: farm,
                period: *period,
                status: ReportStatus::Ready,
                share_token: existing
                    .as_ref()
                    .map(|prev| prev.share_token.clone())
                    .unwrap_or_else(|| fresh_token.clone()),
                farm_name: farm_name
                    .clone()
                    .or_else(|| existing.as_ref().and_then(|prev| prev.farm_name.clone())),
                fields: ReportFields::new(),
                error_stage: None,
                error_message: None,
                created_at: existing.as_ref().map(|prev| prev.created_at).unwrap_or(now),
                updated_at: now,
            };

            let encoded = encode_json("report", &report).map_err(ConflictableTransactionError::Abort)?;
            reports.insert(key.as_bytes(), encoded)?;
            Ok(report)
        });
        finish(result)
    }

    async fn open_job(&self, mut entry: JobLogEntry) -> Result<JobLogEntry, StoreError> {
        entry.id = self.next_seq("job")?;
        self.jobs
            .insert(job_key(entry.run_id, entry.id), encode_bin("job", &entry)?)?;
        Ok(entry)
    }

    async fn close_job(&self, entry: &JobLogEntry) -> Result<(), StoreError> {
        let key = job_key(entry.run_id, entry.id);
        let encoded = encode_bin("job", entry)?;
        let result = self.jobs.transaction(|tx| {
            let Some(bytes) = tx.get(&key)? else {
                return abort(StoreError::JobNotFound(entry.id));
            };
            let stored: JobLogEntry =
                decode_bin("job", &bytes).map_err(ConflictableTransactionError::Abort)?;
            if stored.status.is_terminal() {
                return abort(StoreError::JobClosed(entry.id));
            }
            tx.insert(key.as_slice(), encoded.as_slice())?;
            Ok(())
        });
        finish(result)
    }

    async fn commit_entity(&self, commit: EntityCommit) -> Result<(), StoreError> {
        let key = report_key(commit.farm_id, &commit.period);

        let mut stage_jobs = Vec::with_capacity(commit.stage_jobs.len());
        for mut job in commit.stage_jobs.iter().cloned() {
            job.id = self.next_seq("job")?;
            stage_jobs.push((job_key(job.run_id, job.id), encode_bin("job", &job)?));
        }
        let pipeline_key = job_key(commit.pipeline_job.run_id, commit.pipeline_job.id);
        let pipeline_bytes = encode_bin("job", &commit.pipeline_job)?;
        let details_bytes = encode_json("details", &commit.details)?;

        let result = (&self.reports, &self.details, &self.jobs).transaction(
            |(reports, details, jobs)| {
                let Some(bytes) = reports.get(key.as_bytes())? else {
                    return abort(StoreError::ReportNotFound(commit.report_id));
                };
                let mut report: EntityReport =
                    decode_json("report", &bytes).map_err(ConflictableTransactionError::Abort)?;
                if report.id != commit.report_id {
                    return abort(StoreError::Superseded {
                        farm: commit.farm_id,
                        period: commit.period.key(),
                        newer: report.run_id,
                    });
                }

                match jobs.get(pipeline_key.as_slice())? {
                    Some(bytes) => {
                        let stored: JobLogEntry = decode_bin("job", &bytes)
                            .map_err(ConflictableTransactionError::Abort)?;
                        if stored.status.is_terminal() {
                            return abort(StoreError::JobClosed(stored.id));
                        }
                    }
                    None => return abort(StoreError::JobNotFound(commit.pipeline_job.id)),
                }

                report.status = commit.status;
                report.fields = commit.fields.clone();
                report.error_stage = commit.error_stage.clone();
                report.error_message = commit.error_message.clone();
                report.updated_at = Utc::now();
                let encoded =
                    encode_json("report", &report).map_err(ConflictableTransactionError::Abort)?;

                reports.insert(key.as_bytes(), encoded)?;
                details.insert(id_key(report.id), details_bytes.as_slice())?;
                for (entry_key, entry_bytes) in &stage_jobs {
                    jobs.insert(entry_key.as_slice(), entry_bytes.as_slice())?;
                }
                jobs.insert(pipeline_key.as_slice(), pipeline_bytes.as_slice())?;
                Ok(())
            },
        );
        finish(result)
    }

    async fn load_report(
        &self,
        farm: FarmId,
        period: &ReportPeriod,
    ) -> Result<Option<EntityReport>, StoreError> {
        match self.reports.get(report_key(farm, period))? {
            Some(bytes) => Ok(Some(decode_json("report", &bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_details(&self, report_id: u64) -> Result<Vec<ReportDetail>, StoreError> {
        match self.details.get(id_key(report_id))? {
            Some(bytes) => decode_json("details", &bytes),
            None => Ok(Vec::new()),
        }
    }

    async fn job_logs(&self, run_id: RunId) -> Result<Vec<JobLogEntry>, StoreError> {
        let mut entries = Vec::new();
        for item in self.jobs.scan_prefix(run_id.get().to_be_bytes()) {
            let (_key, value) = item?;
            entries.push(decode_bin("job", &value)?);
        }
        Ok(entries)
    }
}
