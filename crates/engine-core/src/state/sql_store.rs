use crate::{
    error::StoreError,
    state::{EntityCommit, Outcome, ReportStore},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use connectors::sql::base::{adapter::SqlAdapter, statement::Statement};
use model::{
    core::{
        identifiers::{FarmId, RunId},
        value::Value,
    },
    period::{PeriodKind, ReportPeriod},
    records::{
        job_log::{JobLogEntry, JobStatus},
        report::{EntityReport, ReportDetail, ReportFields, ReportStatus},
        row::RowData,
        run::{RunRecord, RunStatus},
    },
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");
const OPEN_REPORT_SQL: &str = include_str!("sql/open_report.sql");

const RUN_COLUMNS: &str = "id, period_kind, reference_date, period_from, period_to, period_year, \
     period_week, status, target_count, complete_count, error_count, started_at, ended_at";

const REPORT_COLUMNS: &str = "id, run_id, farm_id, period_kind, period_from, period_to, \
     period_year, period_week, status, share_token, farm_name, fields, error_stage, \
     error_message, created_at, updated_at";

const JOB_COLUMNS: &str = "id, run_id, farm_id, stage_name, status, started_at, ended_at, \
     elapsed_ms, processed_count, error_code, error_message";

/// Report store over the shared relational database.
#[derive(Clone)]
pub struct SqlReportStore {
    adapter: Arc<dyn SqlAdapter>,
}

impl SqlReportStore {
    pub fn new(adapter: Arc<dyn SqlAdapter>) -> Self {
        SqlReportStore { adapter }
    }

    /// Creates the tables when missing.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.adapter.execute_script(SCHEMA_SQL).await?;
        info!("Report store schema ready");
        Ok(())
    }

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<RowData>, StoreError> {
        Ok(self.adapter.query(sql, params).await?.into_iter().next())
    }
}

fn int(v: u64) -> Value {
    Value::from(v)
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Decode {
        what: "row",
        message: format!("missing or invalid column '{column}'"),
    })
}

fn period_from_row(row: &RowData) -> Result<ReportPeriod, StoreError> {
    let kind: PeriodKind = required(row.get_string("period_kind"), "period_kind")?
        .parse()
        .map_err(|e: model::period::PeriodError| StoreError::Decode {
            what: "period",
            message: e.to_string(),
        })?;
    Ok(ReportPeriod {
        kind,
        from: required(row.get_date("period_from"), "period_from")?,
        to: required(row.get_date("period_to"), "period_to")?,
        year: required(row.get_i64("period_year"), "period_year")? as i32,
        week_no: required(row.get_i64("period_week"), "period_week")? as u32,
    })
}

fn timestamp(row: &RowData, column: &str) -> Option<chrono::DateTime<Utc>> {
    match row.get_value(column) {
        Value::Timestamp(ts) => Some(ts),
        _ => None,
    }
}

fn run_from_row(row: &RowData) -> Result<RunRecord, StoreError> {
    let status = required(row.get_string("status").as_deref().and_then(RunStatus::parse), "status")?;
    Ok(RunRecord {
        id: RunId(required(row.get_i64("id"), "id")? as u64),
        kind: required(row.get_string("period_kind"), "period_kind")?
            .parse()
            .unwrap_or(PeriodKind::Week),
        reference_date: required(row.get_date("reference_date"), "reference_date")?,
        period: period_from_row(row)?,
        status,
        target_count: row.get_i64("target_count").unwrap_or(0) as u64,
        complete_count: row.get_i64("complete_count").unwrap_or(0) as u64,
        error_count: row.get_i64("error_count").unwrap_or(0) as u64,
        started_at: timestamp(row, "started_at"),
        ended_at: timestamp(row, "ended_at"),
    })
}

fn report_from_row(row: &RowData) -> Result<EntityReport, StoreError> {
    let fields: ReportFields = match row.get_value("fields") {
        Value::Json(json) => serde_json::from_value(json).map_err(|e| StoreError::Decode {
            what: "report fields",
            message: e.to_string(),
        })?,
        _ => ReportFields::new(),
    };
    Ok(EntityReport {
        id: required(row.get_i64("id"), "id")? as u64,
        run_id: RunId(required(row.get_i64("run_id"), "run_id")? as u64),
        farm_id: FarmId(required(row.get_i64("farm_id"), "farm_id")?),
        period: period_from_row(row)?,
        status: required(
            row.get_string("status").as_deref().and_then(ReportStatus::parse),
            "status",
        )?,
        share_token: required(row.get_string("share_token"), "share_token")?,
        farm_name: row.get_string("farm_name"),
        fields,
        error_stage: row.get_string("error_stage"),
        error_message: row.get_string("error_message"),
        created_at: required(timestamp(row, "created_at"), "created_at")?,
        updated_at: required(timestamp(row, "updated_at"), "updated_at")?,
    })
}

fn detail_from_row(row: &RowData) -> Result<ReportDetail, StoreError> {
    let payload = match row.get_value("payload") {
        Value::Json(json) => json,
        _ => serde_json::Value::Null,
    };
    Ok(ReportDetail {
        stage: required(row.get_string("stage_name"), "stage_name")?,
        kind: required(row.get_string("detail_kind"), "detail_kind")?,
        sort_no: row.get_i64("sort_no").unwrap_or(0) as u32,
        payload,
    })
}

fn job_from_row(row: &RowData) -> Result<JobLogEntry, StoreError> {
    Ok(JobLogEntry {
        id: required(row.get_i64("id"), "id")? as u64,
        run_id: RunId(required(row.get_i64("run_id"), "run_id")? as u64),
        farm_id: row.get_i64("farm_id").map(FarmId),
        stage: required(row.get_string("stage_name"), "stage_name")?,
        status: required(
            row.get_string("status").as_deref().and_then(JobStatus::parse),
            "status",
        )?,
        started_at: required(timestamp(row, "started_at"), "started_at")?,
        ended_at: timestamp(row, "ended_at"),
        elapsed_ms: row.get_i64("elapsed_ms").map(|v| v.max(0) as u64),
        processed_count: row.get_i64("processed_count").unwrap_or(0).max(0) as u64,
        error_code: row.get_string("error_code"),
        error_message: row.get_string("error_message"),
    })
}

fn insert_job_statement(job: &JobLogEntry) -> Statement {
    Statement::new(
        "INSERT INTO farmrep_job_log (run_id, farm_id, stage_name, status, started_at, ended_at, \
         elapsed_ms, processed_count, error_code, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        vec![
            int(job.run_id.get()),
            job.farm_id.map(FarmId::get).into(),
            job.stage.clone().into(),
            job.status.as_str().into(),
            job.started_at.into(),
            job.ended_at.into(),
            job.elapsed_ms.into(),
            int(job.processed_count),
            job.error_code.clone().into(),
            job.error_message.clone().into(),
        ],
    )
}

fn close_job_statement(job: &JobLogEntry) -> Statement {
    Statement::new(
        "UPDATE farmrep_job_log SET status = $1, ended_at = $2, elapsed_ms = $3, \
         processed_count = $4, error_code = $5, error_message = $6 \
         WHERE id = $7 AND status = 'RUNNING'",
        vec![
            job.status.as_str().into(),
            job.ended_at.into(),
            job.elapsed_ms.into(),
            int(job.processed_count),
            job.error_code.clone().into(),
            job.error_message.clone().into(),
            int(job.id),
        ],
    )
    .expecting(1)
}

#[async_trait]
impl ReportStore for SqlReportStore {
    async fn create_run(
        &self,
        reference_date: NaiveDate,
        period: ReportPeriod,
    ) -> Result<RunRecord, StoreError> {
        let sql = format!(
            "INSERT INTO farmrep_run (period_kind, reference_date, period_from, period_to, \
             period_year, period_week, status) VALUES ($1, $2, $3, $4, $5, $6, 'READY') \
             RETURNING {RUN_COLUMNS}"
        );
        let row = self
            .query_one(
                &sql,
                vec![
                    period.kind.as_str().into(),
                    reference_date.into(),
                    period.from.into(),
                    period.to.into(),
                    Value::Int(i64::from(period.year)),
                    period.week_no.into(),
                ],
            )
            .await?;
        let run = run_from_row(&required(row, "id")?)?;
        debug!(run_id = %run.id, "Run record created");
        Ok(run)
    }

    async fn update_run(&self, run: &RunRecord) -> Result<RunRecord, StoreError> {
        let sql = format!(
            "UPDATE farmrep_run SET status = $1, target_count = $2, started_at = $3, ended_at = $4 \
             WHERE id = $5 RETURNING {RUN_COLUMNS}"
        );
        let row = self
            .query_one(
                &sql,
                vec![
                    run.status.as_str().into(),
                    int(run.target_count),
                    run.started_at.into(),
                    run.ended_at.into(),
                    int(run.id.get()),
                ],
            )
            .await?
            .ok_or(StoreError::RunNotFound(run.id))?;
        run_from_row(&row)
    }

    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>, StoreError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM farmrep_run WHERE id = $1");
        self.query_one(&sql, vec![int(id.get())])
            .await?
            .as_ref()
            .map(run_from_row)
            .transpose()
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM farmrep_run ORDER BY id DESC LIMIT $1");
        let rows = self.adapter.query(&sql, vec![limit.into()]).await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn record_outcome(&self, id: RunId, outcome: Outcome) -> Result<RunRecord, StoreError> {
        let column = match outcome {
            Outcome::Complete => "complete_count",
            Outcome::Error => "error_count",
        };
        // Single-statement increment; the database serialises concurrent updates.
        let sql = format!(
            "UPDATE farmrep_run SET {column} = {column} + 1 WHERE id = $1 RETURNING {RUN_COLUMNS}"
        );
        let row = self
            .query_one(&sql, vec![int(id.get())])
            .await?
            .ok_or(StoreError::RunNotFound(id))?;
        run_from_row(&row)
    }

    async fn open_report(
        &self,
        run_id: RunId,
        farm: FarmId,
        period: &ReportPeriod,
        farm_name: Option<String>,
    ) -> Result<EntityReport, StoreError> {
        let now = Utc::now();
        let row = self
            .query_one(
                OPEN_REPORT_SQL,
                vec![
                    int(run_id.get()),
                    Value::Int(farm.get()),
                    period.key().into(),
                    period.kind.as_str().into(),
                    period.from.into(),
                    period.to.into(),
                    Value::Int(i64::from(period.year)),
                    period.week_no.into(),
                    Uuid::new_v4().to_string().into(),
                    farm_name.clone().into(),
                    now.into(),
                ],
            )
            .await?;

        let Some(row) = row else {
            // The guarded upsert skipped the row: a newer run owns it.
            let newer = self
                .load_report(farm, period)
                .await?
                .map(|r| r.run_id)
                .unwrap_or(run_id);
            return Err(StoreError::Superseded {
                farm,
                period: period.key(),
                newer,
            });
        };

        let id = required(row.get_i64("id"), "id")? as u64;
        self.adapter
            .execute(
                "DELETE FROM farmrep_report_detail WHERE report_id = $1",
                vec![int(id)],
            )
            .await?;

        Ok(EntityReport {
            id,
            run_id,
            farm_id: farm,
            period: *period,
            status: ReportStatus::Ready,
            share_token: required(row.get_string("share_token"), "share_token")?,
            farm_name: row.get_string("farm_name").or(farm_name),
            fields: ReportFields::new(),
            error_stage: None,
            error_message: None,
            created_at: timestamp(&row, "created_at").unwrap_or(now),
            updated_at: now,
        })
    }

    async fn open_job(&self, mut entry: JobLogEntry) -> Result<JobLogEntry, StoreError> {
        let statement = insert_job_statement(&entry);
        let sql = format!("{} RETURNING id", statement.sql);
        let row = self.query_one(&sql, statement.params).await?;
        entry.id = required(row.and_then(|r| r.get_i64("id")), "id")? as u64;
        Ok(entry)
    }

    async fn close_job(&self, entry: &JobLogEntry) -> Result<(), StoreError> {
        let statement = close_job_statement(entry);
        let updated = self.adapter.execute(&statement.sql, statement.params).await?;
        if updated == 0 {
            return Err(StoreError::JobClosed(entry.id));
        }
        Ok(())
    }

    async fn commit_entity(&self, commit: EntityCommit) -> Result<(), StoreError> {
        let fields = serde_json::to_value(&commit.fields).map_err(|e| StoreError::Encode {
            what: "report fields",
            message: e.to_string(),
        })?;

        let mut statements = vec![
            Statement::new(
                "UPDATE farmrep_report SET status = $1, fields = $2, error_stage = $3, \
                 error_message = $4, updated_at = $5 WHERE id = $6 AND run_id = $7",
                vec![
                    commit.status.as_str().into(),
                    Value::Json(fields),
                    commit.error_stage.clone().into(),
                    commit.error_message.clone().into(),
                    Utc::now().into(),
                    int(commit.report_id),
                    int(commit.run_id.get()),
                ],
            )
            .expecting(1),
            Statement::new(
                "DELETE FROM farmrep_report_detail WHERE report_id = $1",
                vec![int(commit.report_id)],
            ),
        ];

        for detail in &commit.details {
            statements.push(Statement::new(
                "INSERT INTO farmrep_report_detail (report_id, stage_name, detail_kind, sort_no, payload) \
                 VALUES ($1, $2, $3, $4, $5)",
                vec![
                    int(commit.report_id),
                    detail.stage.clone().into(),
                    detail.kind.clone().into(),
                    detail.sort_no.into(),
                    Value::Json(detail.payload.clone()),
                ],
            ));
        }
        statements.extend(commit.stage_jobs.iter().map(insert_job_statement));
        statements.push(close_job_statement(&commit.pipeline_job));

        let affected = self.adapter.execute_in_transaction(statements).await?;
        debug!(farm = %commit.farm_id, affected, "Entity results committed");
        Ok(())
    }

    async fn load_report(
        &self,
        farm: FarmId,
        period: &ReportPeriod,
    ) -> Result<Option<EntityReport>, StoreError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM farmrep_report WHERE farm_id = $1 AND period_key = $2"
        );
        self.query_one(&sql, vec![Value::Int(farm.get()), period.key().into()])
            .await?
            .as_ref()
            .map(report_from_row)
            .transpose()
    }

    async fn load_details(&self, report_id: u64) -> Result<Vec<ReportDetail>, StoreError> {
        let rows = self
            .adapter
            .query(
                "SELECT stage_name, detail_kind, sort_no, payload FROM farmrep_report_detail \
                 WHERE report_id = $1 ORDER BY id",
                vec![int(report_id)],
            )
            .await?;
        rows.iter().map(detail_from_row).collect()
    }

    async fn job_logs(&self, run_id: RunId) -> Result<Vec<JobLogEntry>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM farmrep_job_log WHERE run_id = $1 ORDER BY id");
        let rows = self.adapter.query(&sql, vec![int(run_id.get())]).await?;
        rows.iter().map(job_from_row).collect()
    }
}
