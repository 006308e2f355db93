use crate::{
    error::{PersistenceError, PipelineError, StageError},
    loader::SnapshotLoader,
    stage::{StageContext, StageRegistry},
};
use engine_core::{
    context::EntityContext,
    error::StoreError,
    state::{EntityCommit, Outcome, ReportStore},
};
use model::{
    core::identifiers::FarmId,
    records::{
        job_log::{JobLogEntry, PIPELINE_STAGE},
        report::{ReportDetail, ReportFields, ReportStatus},
    },
    snapshot::EntitySnapshot,
};
use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{task::spawn_blocking, time::timeout};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Loading,
    Running { stage: usize, of: usize },
    Complete,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Created => f.write_str("CREATED"),
            PipelineState::Loading => f.write_str("LOADING"),
            PipelineState::Running { stage, of } => write!(f, "RUNNING({stage}/{of})"),
            PipelineState::Complete => f.write_str("COMPLETE"),
            PipelineState::Error => f.write_str("ERROR"),
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState, farm: FarmId) {
    debug!(%farm, from = %state, to = %next, "Pipeline transition");
    *state = next;
}

/// What one farm pipeline reports back to the orchestrator.
#[derive(Debug)]
pub struct EntityOutcome {
    pub farm_id: FarmId,
    pub outcome: Outcome,
    pub report_id: Option<u64>,
    pub stages_run: u64,
    pub rows_loaded: u64,
    pub error: Option<PipelineError>,
}

impl EntityOutcome {
    pub fn failed(farm_id: FarmId, report_id: Option<u64>, error: PipelineError) -> Self {
        EntityOutcome {
            farm_id,
            outcome: Outcome::Error,
            report_id,
            stages_run: 0,
            rows_loaded: 0,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == Outcome::Complete
    }
}

struct ChainResult {
    fields: ReportFields,
    details: Vec<ReportDetail>,
    stage_jobs: Vec<JobLogEntry>,
    error: Option<PipelineError>,
}

impl ChainResult {
    fn with_capacity(stages: usize) -> Self {
        ChainResult {
            fields: ReportFields::new(),
            details: Vec::new(),
            stage_jobs: Vec::with_capacity(stages),
            error: None,
        }
    }
}

/// Runs the ordered stage chain for one farm and writes its terminal state
/// in a single commit. Run counters are left to the caller.
#[derive(Clone)]
pub struct EntityPipeline {
    loader: Arc<SnapshotLoader>,
    stages: StageRegistry,
    store: Arc<dyn ReportStore>,
    timeout: Option<Duration>,
}

impl EntityPipeline {
    pub fn new(
        loader: Arc<SnapshotLoader>,
        stages: StageRegistry,
        store: Arc<dyn ReportStore>,
        timeout: Option<Duration>,
    ) -> Self {
        EntityPipeline {
            loader,
            stages,
            store,
            timeout,
        }
    }

    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    pub async fn execute(&self, ctx: &EntityContext) -> EntityOutcome {
        let farm = ctx.farm_id;
        let started = Instant::now();
        let mut state = PipelineState::Created;

        transition(&mut state, PipelineState::Loading, farm);
        let snapshot = match self.load(ctx).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                transition(&mut state, PipelineState::Error, farm);
                warn!(%farm, error = %err, "Snapshot unavailable, no stages run");
                return self.fail_before_stages(ctx, err).await;
            }
        };
        let rows_loaded = snapshot.row_count() as u64;

        let report = match self
            .store
            .open_report(ctx.run_id, farm, &ctx.period, Some(snapshot.farm.name.clone()))
            .await
        {
            Ok(report) => report,
            Err(source) => {
                transition(&mut state, PipelineState::Error, farm);
                return self.fail_unrecorded(ctx, None, source).await;
            }
        };
        let open_job = match self
            .store
            .open_job(JobLogEntry::running(ctx.run_id, Some(farm), PIPELINE_STAGE))
            .await
        {
            Ok(job) => job,
            Err(source) => {
                transition(&mut state, PipelineState::Error, farm);
                return self.fail_unrecorded(ctx, Some(report.id), source).await;
            }
        };

        let (chain, last) = self.run_stages(snapshot, ctx, state, started).await;
        state = last;
        let stages_run = chain.stage_jobs.len() as u64;

        let (status, terminal, pipeline_job) = match &chain.error {
            None => (
                ReportStatus::Complete,
                PipelineState::Complete,
                open_job.clone().succeed(stages_run),
            ),
            Some(err) => (
                ReportStatus::Error,
                PipelineState::Error,
                open_job.clone().fail(err.code(), &err.to_string()),
            ),
        };
        transition(&mut state, terminal, farm);

        let commit = EntityCommit {
            report_id: report.id,
            run_id: ctx.run_id,
            farm_id: farm,
            period: ctx.period,
            status,
            fields: chain.fields,
            details: chain.details,
            error_stage: chain.error.as_ref().and_then(|e| e.stage().map(str::to_string)),
            error_message: chain.error.as_ref().map(|e| e.to_string()),
            stage_jobs: chain.stage_jobs,
            pipeline_job,
        };

        let error = match self.store.commit_entity(commit).await {
            Ok(()) => chain.error,
            Err(source) => {
                let err = PipelineError::Persistence(PersistenceError { farm, source });
                error!(%farm, error = %err, "Failed to commit farm results");
                self.commit_minimal_error(ctx, report.id, open_job, &err).await;
                Some(err)
            }
        };

        match error {
            None => {
                debug!(
                    %farm,
                    stages = stages_run,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Farm complete"
                );
                EntityOutcome {
                    farm_id: farm,
                    outcome: Outcome::Complete,
                    report_id: Some(report.id),
                    stages_run,
                    rows_loaded,
                    error: None,
                }
            }
            Some(err) => EntityOutcome {
                stages_run,
                rows_loaded,
                ..EntityOutcome::failed(farm, Some(report.id), err)
            },
        }
    }

    /// Records a farm the run never dispatched. Only the job log is written;
    /// the farm's current report is left as it was.
    pub async fn record_cancelled(&self, ctx: &EntityContext) -> EntityOutcome {
        let err = PipelineError::Cancelled(ctx.farm_id);
        self.append_failed_job(ctx, &err).await;
        EntityOutcome::failed(ctx.farm_id, None, err)
    }

    async fn load(&self, ctx: &EntityContext) -> Result<EntitySnapshot, PipelineError> {
        let load = self.loader.load(ctx.farm_id, &ctx.period);
        match self.timeout {
            Some(limit) => match timeout(limit, load).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(PipelineError::Timeout {
                    farm: ctx.farm_id,
                    secs: limit.as_secs(),
                }),
            },
            None => Ok(load.await?),
        }
    }

    /// Stages are synchronous, so the chain runs on the blocking pool and
    /// keeps CPU-heavy farms off the async workers.
    async fn run_stages(
        &self,
        snapshot: EntitySnapshot,
        ctx: &EntityContext,
        state: PipelineState,
        started: Instant,
    ) -> (ChainResult, PipelineState) {
        let stages = self.stages.clone();
        let limit = self.timeout;
        let farm = ctx.farm_id;
        let ctx = ctx.clone();

        spawn_blocking(move || {
            let mut state = state;
            let chain = run_chain(&stages, limit, &snapshot, &ctx, &mut state, started);
            (chain, state)
        })
        .await
        .unwrap_or_else(|err| {
            error!(%farm, error = %err, "Stage chain task failed");
            let mut chain = ChainResult::with_capacity(0);
            chain.error = Some(StageError::new("pipeline", err.to_string()).into());
            (chain, state)
        })
    }

    /// DATA_UNAVAILABLE or TIMEOUT while loading: an ERROR report without
    /// stage entries.
    async fn fail_before_stages(&self, ctx: &EntityContext, err: PipelineError) -> EntityOutcome {
        let farm = ctx.farm_id;
        let report = match self
            .store
            .open_report(ctx.run_id, farm, &ctx.period, None)
            .await
        {
            Ok(report) => report,
            Err(source) => return self.fail_unrecorded(ctx, None, source).await,
        };
        let open_job = match self
            .store
            .open_job(JobLogEntry::running(ctx.run_id, Some(farm), PIPELINE_STAGE))
            .await
        {
            Ok(job) => job,
            Err(source) => return self.fail_unrecorded(ctx, Some(report.id), source).await,
        };

        let commit = EntityCommit {
            report_id: report.id,
            run_id: ctx.run_id,
            farm_id: farm,
            period: ctx.period,
            status: ReportStatus::Error,
            fields: ReportFields::new(),
            details: Vec::new(),
            error_stage: None,
            error_message: Some(err.to_string()),
            stage_jobs: Vec::new(),
            pipeline_job: open_job.fail(err.code(), &err.to_string()),
        };
        if let Err(source) = self.store.commit_entity(commit).await {
            error!(%farm, error = %source, "Failed to record farm error");
        }

        EntityOutcome::failed(farm, Some(report.id), err)
    }

    /// The report could not be opened; only a job log entry is left behind.
    async fn fail_unrecorded(
        &self,
        ctx: &EntityContext,
        report_id: Option<u64>,
        source: StoreError,
    ) -> EntityOutcome {
        let err = PipelineError::Persistence(PersistenceError {
            farm: ctx.farm_id,
            source,
        });
        error!(farm = %ctx.farm_id, error = %err, "Cannot record farm results");
        self.append_failed_job(ctx, &err).await;
        EntityOutcome::failed(ctx.farm_id, report_id, err)
    }

    /// Falls back to an ERROR report without fields or details so the
    /// report never stays READY.
    async fn commit_minimal_error(
        &self,
        ctx: &EntityContext,
        report_id: u64,
        open_job: JobLogEntry,
        err: &PipelineError,
    ) {
        let failed_job = open_job.fail(err.code(), &err.to_string());
        let commit = EntityCommit {
            report_id,
            run_id: ctx.run_id,
            farm_id: ctx.farm_id,
            period: ctx.period,
            status: ReportStatus::Error,
            fields: ReportFields::new(),
            details: Vec::new(),
            error_stage: None,
            error_message: Some(err.to_string()),
            stage_jobs: Vec::new(),
            pipeline_job: failed_job.clone(),
        };
        if let Err(fallback) = self.store.commit_entity(commit).await {
            warn!(farm = %ctx.farm_id, error = %fallback, "Fallback commit failed, closing job only");
            if let Err(close) = self.store.close_job(&failed_job).await {
                error!(farm = %ctx.farm_id, error = %close, "Failed to close pipeline job");
            }
        }
    }

    async fn append_failed_job(&self, ctx: &EntityContext, err: &PipelineError) {
        let entry = JobLogEntry::running(ctx.run_id, Some(ctx.farm_id), PIPELINE_STAGE);
        let result = match self.store.open_job(entry).await {
            Ok(open) => {
                self.store
                    .close_job(&open.fail(err.code(), &err.to_string()))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(farm = %ctx.farm_id, error = %e, "Failed to append job log entry");
        }
    }
}

/// Runs every stage in order until one fails or the farm runs out of time.
/// The limit is checked before a stage starts and again after it returns.
fn run_chain(
    stages: &StageRegistry,
    limit: Option<Duration>,
    snapshot: &EntitySnapshot,
    ctx: &EntityContext,
    state: &mut PipelineState,
    started: Instant,
) -> ChainResult {
    let total = stages.len();
    let mut chain = ChainResult::with_capacity(total);

    for (idx, stage) in stages.iter().enumerate() {
        if let Some(err) = overrun(limit, started, ctx.farm_id) {
            chain.error = Some(err);
            break;
        }

        transition(
            state,
            PipelineState::Running {
                stage: idx + 1,
                of: total,
            },
            ctx.farm_id,
        );
        let job = JobLogEntry::running(ctx.run_id, Some(ctx.farm_id), stage.name());
        let stage_ctx = StageContext {
            entity: ctx,
            fields: &chain.fields,
        };

        let result = catch_unwind(AssertUnwindSafe(|| stage.run(snapshot, &stage_ctx)))
            .unwrap_or_else(|panic| {
                Err(StageError::new(stage.name(), panic_message(panic.as_ref())))
            });

        match result {
            Ok(output) => {
                chain
                    .stage_jobs
                    .push(job.succeed(output.details.len() as u64));
                chain.fields.extend(output.fields);
                chain.details.extend(output.details);
            }
            Err(err) => {
                let err = StageError::new(stage.name(), err.message);
                warn!(farm = %ctx.farm_id, stage = stage.name(), error = %err.message, "Stage failed");
                chain.stage_jobs.push(job.fail("STAGE_FAILED", &err.message));
                chain.error = Some(err.into());
                break;
            }
        }

        if let Some(err) = overrun(limit, started, ctx.farm_id) {
            warn!(farm = %ctx.farm_id, stage = stage.name(), "Farm exceeded its time limit");
            chain.error = Some(err);
            break;
        }
    }

    chain
}

fn overrun(limit: Option<Duration>, started: Instant, farm: FarmId) -> Option<PipelineError> {
    let limit = limit?;
    (started.elapsed() > limit).then(|| PipelineError::Timeout {
        farm,
        secs: limit.as_secs(),
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("stage panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("stage panicked: {msg}")
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        stage::{Stage, StageOutput},
        testing::{StubSource, date, period, snapshot},
    };
    use engine_core::{
        context::{RunContext, SharedValues},
        retry::RetryPolicy,
        state::sled_store::SledReportStore,
    };
    use model::records::job_log::JobStatus;
    use std::collections::BTreeSet;

    struct Boom;

    impl Stage for Boom {
        fn name(&self) -> &str {
            "mating"
        }

        fn run(&self, _: &EntitySnapshot, _: &StageContext<'_>) -> Result<StageOutput, StageError> {
            Err(StageError::new("mating", "sow table corrupt"))
        }
    }

    struct Panics;

    impl Stage for Panics {
        fn name(&self) -> &str {
            "weaning"
        }

        fn run(&self, _: &EntitySnapshot, _: &StageContext<'_>) -> Result<StageOutput, StageError> {
            panic!("index out of range")
        }
    }

    struct Slow;

    impl Stage for Slow {
        fn name(&self) -> &str {
            "schedule"
        }

        fn run(&self, _: &EntitySnapshot, _: &StageContext<'_>) -> Result<StageOutput, StageError> {
            std::thread::sleep(Duration::from_millis(150));
            Ok(StageOutput::default())
        }
    }

    fn pipeline(
        source: StubSource,
        store: Arc<SledReportStore>,
        stages: StageRegistry,
        limit: Option<Duration>,
    ) -> EntityPipeline {
        let retry = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        let loader = Arc::new(SnapshotLoader::new(Arc::new(source), retry));
        EntityPipeline::new(loader, stages, store, limit)
    }

    async fn context(store: &SledReportStore) -> EntityContext {
        let run = store.create_run(date(6, 16), period()).await.unwrap();
        RunContext::new(run.id, period(), SharedValues::default()).for_farm(FarmId(1))
    }

    #[tokio::test]
    async fn complete_farm_writes_every_stage() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let pipeline = pipeline(
            StubSource::with_farm(snapshot()),
            store.clone(),
            StageRegistry::standard(),
            None,
        );

        let outcome = pipeline.execute(&ctx).await;
        assert!(outcome.is_complete(), "{:?}", outcome.error);
        assert_eq!(outcome.stages_run, 10);

        let report = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(report.farm_name.as_deref(), Some("Farm 1"));
        assert!(report.fields.contains_key("cfg_gestation_days"));
        assert!(report.fields.contains_key("sched_mating"));

        let details = store.load_details(report.id).await.unwrap();
        let stages: BTreeSet<_> = details.iter().map(|d| d.stage.as_str()).collect();
        assert_eq!(stages.len(), 10);

        let jobs = store.job_logs(ctx.run_id).await.unwrap();
        assert_eq!(jobs.len(), 11);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Success));
        let order: Vec<_> = jobs
            .iter()
            .filter(|j| j.stage != PIPELINE_STAGE)
            .map(|j| j.stage.clone())
            .collect();
        assert_eq!(order, pipeline.stages().names());
    }

    #[tokio::test]
    async fn stage_failure_keeps_earlier_details() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let mut stages = StageRegistry::standard();
        stages.replace("mating", Arc::new(Boom));
        let pipeline = pipeline(StubSource::with_farm(snapshot()), store.clone(), stages, None);

        let outcome = pipeline.execute(&ctx).await;
        assert_eq!(outcome.outcome, Outcome::Error);
        assert_eq!(outcome.error.as_ref().map(|e| e.code()), Some("STAGE_FAILED"));
        assert_eq!(outcome.stages_run, 4);

        let report = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.error_stage.as_deref(), Some("mating"));
        assert!(report.error_message.unwrap().contains("sow table corrupt"));

        let details = store.load_details(report.id).await.unwrap();
        let stages: BTreeSet<_> = details.iter().map(|d| d.stage.as_str()).collect();
        assert_eq!(
            stages,
            BTreeSet::from(["configuration", "alert", "status_summary"])
        );

        let jobs = store.job_logs(ctx.run_id).await.unwrap();
        let failed: Vec<_> = jobs.iter().filter(|j| j.status == JobStatus::Error).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().any(|j| j.stage == "mating"));
        assert!(
            failed
                .iter()
                .any(|j| j.stage == PIPELINE_STAGE && j.error_code.as_deref() == Some("STAGE_FAILED"))
        );
    }

    #[tokio::test]
    async fn panicking_stage_is_a_stage_error() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let mut stages = StageRegistry::standard();
        stages.replace("weaning", Arc::new(Panics));
        let pipeline = pipeline(StubSource::with_farm(snapshot()), store.clone(), stages, None);

        let outcome = pipeline.execute(&ctx).await;
        let err = outcome.error.unwrap();
        assert_eq!(err.stage(), Some("weaning"));
        assert!(err.to_string().contains("index out of range"));
    }

    #[tokio::test]
    async fn missing_farm_is_data_unavailable() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let pipeline = pipeline(
            StubSource::default(),
            store.clone(),
            StageRegistry::standard(),
            None,
        );

        let outcome = pipeline.execute(&ctx).await;
        assert_eq!(outcome.stages_run, 0);
        assert_eq!(outcome.error.as_ref().map(|e| e.code()), Some("DATA_UNAVAILABLE"));

        let report = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Error);
        assert!(store.load_details(report.id).await.unwrap().is_empty());

        let jobs = store.job_logs(ctx.run_id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].error_code.as_deref(), Some("DATA_UNAVAILABLE"));
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let mut source = StubSource::with_farm(snapshot());
        source.failures = 2;
        let pipeline = pipeline(source, store.clone(), StageRegistry::standard(), None);

        assert!(pipeline.execute(&ctx).await.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_load_times_out() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let mut source = StubSource::with_farm(snapshot());
        source.delay = Some(Duration::from_secs(30));
        let pipeline = pipeline(
            source,
            store.clone(),
            StageRegistry::standard(),
            Some(Duration::from_secs(5)),
        );

        let outcome = pipeline.execute(&ctx).await;
        assert_eq!(outcome.error.as_ref().map(|e| e.code()), Some("TIMEOUT"));
        let report = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Error);
    }

    #[tokio::test]
    async fn slow_last_stage_times_out() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let mut stages = StageRegistry::standard();
        stages.replace("schedule", Arc::new(Slow));
        let pipeline = pipeline(
            StubSource::with_farm(snapshot()),
            store.clone(),
            stages,
            Some(Duration::from_millis(50)),
        );

        let outcome = pipeline.execute(&ctx).await;
        assert_eq!(outcome.outcome, Outcome::Error);
        assert_eq!(outcome.error.as_ref().map(|e| e.code()), Some("TIMEOUT"));

        let report = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Error);

        let jobs = store.job_logs(ctx.run_id).await.unwrap();
        let pipeline_job = jobs.iter().find(|j| j.stage == PIPELINE_STAGE).unwrap();
        assert_eq!(pipeline_job.status, JobStatus::Error);
        assert_eq!(pipeline_job.error_code.as_deref(), Some("TIMEOUT"));
    }

    #[tokio::test]
    async fn rerun_supersedes_and_appends_jobs() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let first_ctx = context(&store).await;
        let second_ctx = context(&store).await;
        let pipeline = pipeline(
            StubSource::with_farm(snapshot()),
            store.clone(),
            StageRegistry::standard(),
            None,
        );

        let first = pipeline.execute(&first_ctx).await;
        let token = store
            .load_report(FarmId(1), &period())
            .await
            .unwrap()
            .unwrap()
            .share_token;
        let second = pipeline.execute(&second_ctx).await;
        assert!(first.is_complete() && second.is_complete());
        assert_ne!(first.report_id, second.report_id);

        let current = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(current.run_id, second_ctx.run_id);
        assert_eq!(current.share_token, token);
        assert!(store.load_details(first.report_id.unwrap()).await.unwrap().is_empty());
        assert_eq!(store.job_logs(first_ctx.run_id).await.unwrap().len(), 11);
        assert_eq!(store.job_logs(second_ctx.run_id).await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn older_run_cannot_overwrite_newer_report() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let older = context(&store).await;
        let newer = context(&store).await;
        let pipeline = pipeline(
            StubSource::with_farm(snapshot()),
            store.clone(),
            StageRegistry::standard(),
            None,
        );

        assert!(pipeline.execute(&newer).await.is_complete());
        let stale = pipeline.execute(&older).await;
        assert_eq!(stale.error.as_ref().map(|e| e.code()), Some("PERSISTENCE"));

        let current = store.load_report(FarmId(1), &period()).await.unwrap().unwrap();
        assert_eq!(current.run_id, newer.run_id);
        assert_eq!(current.status, ReportStatus::Complete);
        let jobs = store.job_logs(older.run_id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].error_code.as_deref(), Some("PERSISTENCE"));
    }

    #[tokio::test]
    async fn cancelled_farm_only_touches_the_job_log() {
        let store = Arc::new(SledReportStore::temporary().unwrap());
        let ctx = context(&store).await;
        let pipeline = pipeline(
            StubSource::with_farm(snapshot()),
            store.clone(),
            StageRegistry::standard(),
            None,
        );

        let outcome = pipeline.record_cancelled(&ctx).await;
        assert_eq!(outcome.error.as_ref().map(|e| e.code()), Some("CANCELLED"));
        assert!(store.load_report(FarmId(1), &period()).await.unwrap().is_none());
        let jobs = store.job_logs(ctx.run_id).await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Error);
    }
}
