use crate::{
    error::BatchError,
    execution::{
        collectors::{UpstreamCollector, run_collectors},
        workers::{self, Dispatch},
    },
};
use chrono::{NaiveDate, Utc};
use engine_config::{
    report::{dry_run::DryRunReport, summary::RunSummary},
    settings::EngineSettings,
};
use engine_core::{
    context::{RunContext, SharedValues},
    error::StoreError,
    metrics::RunCounters,
    retry::RetryPolicy,
    state::ReportStore,
};
use engine_processing::{
    aggregate,
    loader::SnapshotLoader,
    pipeline::EntityPipeline,
    retry::classify_db_error,
    selector::EntitySelector,
    source::FarmSource,
    stage::StageRegistry,
};
use model::{
    core::identifiers::{FarmId, RunId},
    period::{PeriodKind, ReportPeriod},
    records::run::{RunRecord, RunStatus},
};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a batch run derives its period and whether it refreshes upstream data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report the current, partial week instead of the previous full week.
    pub test_mode: bool,
    /// Do not run upstream collectors even when the settings ask for them.
    pub skip_collectors: bool,
}

pub fn resolve_period(kind: PeriodKind, reference: NaiveDate, test_mode: bool) -> ReportPeriod {
    match kind {
        PeriodKind::Week if test_mode => ReportPeriod::current_week(reference),
        PeriodKind::Week => ReportPeriod::previous_week(reference),
    }
}

/// Creates runs, fans them out over farms and finalizes their counters.
pub struct BatchOrchestrator {
    settings: EngineSettings,
    store: Arc<dyn ReportStore>,
    source: Arc<dyn FarmSource>,
    stages: StageRegistry,
    collectors: Vec<Arc<dyn UpstreamCollector>>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn ReportStore>,
        source: Arc<dyn FarmSource>,
        cancel: CancellationToken,
    ) -> Self {
        BatchOrchestrator {
            settings,
            store,
            source,
            stages: StageRegistry::standard(),
            collectors: Vec::new(),
            options: RunOptions::default(),
            cancel,
        }
    }

    pub fn with_stages(mut self, stages: StageRegistry) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn UpstreamCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Scheduled entry point: every eligible farm (or the eligible subset of
    /// `explicit`) for the period derived from `reference`.
    ///
    /// Farm failures are counted on the returned run; only run-fatal errors
    /// are returned as `Err`.
    pub async fn run(
        &self,
        kind: PeriodKind,
        reference: NaiveDate,
        explicit: Option<&[FarmId]>,
    ) -> Result<RunSummary, BatchError> {
        let period = resolve_period(kind, reference, self.options.test_mode);
        info!(%period, %reference, test_mode = self.options.test_mode, "Starting farm report run");

        if self.settings.wait_for_collectors && !self.options.skip_collectors {
            let succeeded = run_collectors(&self.collectors, &period).await;
            info!(succeeded, total = self.collectors.len(), "Upstream collectors done");
        }

        let run = self.store.create_run(reference, period).await?;
        info!(run_id = %run.id, "Run created");

        let selection = match self
            .selector()
            .resolve(reference, explicit, &self.settings.exclude_farms)
            .await
        {
            Ok(selection) => selection,
            Err(err) => {
                error!(run_id = %run.id, error = %err, "Farm selection failed, aborting run");
                self.abort(run).await;
                return Err(err.into());
            }
        };
        if selection.is_empty() {
            warn!(run_id = %run.id, %reference, "No eligible farms");
        }

        self.execute(run, &selection.farms).await
    }

    /// Manual run of one farm over explicit bounds. Bypasses the selector and
    /// owns a fresh run, so a batch in progress keeps its counters.
    pub async fn run_single(
        &self,
        farm: FarmId,
        period: ReportPeriod,
    ) -> Result<RunSummary, BatchError> {
        let reference = Utc::now().date_naive();
        info!(%farm, %period, "Starting single farm run");
        let run = self.store.create_run(reference, period).await?;
        self.execute(run, &[farm]).await
    }

    /// What `run` would process. Nothing is written.
    pub async fn dry_run(
        &self,
        kind: PeriodKind,
        reference: NaiveDate,
        explicit: Option<&[FarmId]>,
    ) -> Result<DryRunReport, BatchError> {
        let period = resolve_period(kind, reference, self.options.test_mode);
        let selection = self
            .selector()
            .resolve(reference, explicit, &self.settings.exclude_farms)
            .await?;

        Ok(DryRunReport::new(
            reference,
            period,
            selection.farms,
            selection.skipped,
            self.stages.names(),
        ))
    }

    fn retry(&self) -> RetryPolicy {
        self.settings.retry.policy()
    }

    fn selector(&self) -> EntitySelector {
        EntitySelector::new(Arc::clone(&self.source), self.retry())
    }

    fn pipeline(&self) -> Arc<EntityPipeline> {
        let loader = Arc::new(SnapshotLoader::new(Arc::clone(&self.source), self.retry()));
        Arc::new(EntityPipeline::new(
            loader,
            self.stages.clone(),
            Arc::clone(&self.store),
            self.settings.entity_timeout(),
        ))
    }

    async fn execute(&self, mut run: RunRecord, farms: &[FarmId]) -> Result<RunSummary, BatchError> {
        let started = Instant::now();
        let national_price = self.national_price(&run.period).await;
        let run_ctx = RunContext::new(
            run.id,
            run.period,
            SharedValues {
                national_price,
                ..SharedValues::default()
            },
        );

        run.status = RunStatus::Running;
        run.target_count = farms.len() as u64;
        run.started_at = Some(Utc::now());
        let run = self.store.update_run(&run).await?;
        info!(
            run_id = %run.id,
            period = %run.period,
            target = run.target_count,
            workers = self.settings.workers,
            national_price,
            "Run started"
        );

        let counters = RunCounters::new();
        let dispatch = workers::spawn(
            self.pipeline(),
            &run_ctx,
            farms,
            self.settings.workers,
            Arc::clone(&self.store),
            counters.clone(),
            self.cancel.clone(),
        )
        .await?;

        let summary = self.finalize(run.id, dispatch, counters).await?;
        info!(
            run_id = %summary.run.id,
            status = %summary.run.status,
            target = summary.run.target_count,
            complete = summary.run.complete_count,
            error = summary.run.error_count,
            stages = summary.stages_run,
            rows = summary.rows_loaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(summary)
    }

    async fn finalize(
        &self,
        run_id: RunId,
        dispatch: Dispatch,
        counters: RunCounters,
    ) -> Result<RunSummary, BatchError> {
        let mut run = self
            .store
            .load_run(run_id)
            .await?
            .ok_or(StoreError::RunNotFound(run_id))?;

        run.status = if dispatch.was_cancelled() {
            RunStatus::Cancelled
        } else if run.error_count > 0 {
            RunStatus::Error
        } else {
            RunStatus::Complete
        };
        run.ended_at = Some(Utc::now());
        let run = self.store.update_run(&run).await?;

        if !run.is_balanced() {
            error!(
                run_id = %run.id,
                target = run.target_count,
                complete = run.complete_count,
                error = run.error_count,
                "Run counters do not add up"
            );
            return Err(BatchError::CounterConsistency {
                run: run.id,
                target: run.target_count,
                complete: run.complete_count,
                error: run.error_count,
            });
        }

        Ok(RunSummary::new(run, counters.snapshot()))
    }

    /// Closes a run that never dispatched. Counters stay at zero.
    async fn abort(&self, mut run: RunRecord) {
        run.status = RunStatus::Error;
        run.ended_at = Some(Utc::now());
        if let Err(err) = self.store.update_run(&run).await {
            error!(run_id = %run.id, error = %err, "Failed to close aborted run");
        }
    }

    /// Weighted national carcass price for the period; 0 when unavailable.
    async fn national_price(&self, period: &ReportPeriod) -> i64 {
        let rows = self
            .retry()
            .run(
                "reference_prices",
                || self.source.reference_prices(period.from, period.to),
                classify_db_error,
            )
            .await;
        match rows {
            Ok(rows) => aggregate::national_price(&rows),
            Err(err) => {
                warn!(%period, error = %err, "National reference price unavailable, using 0");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn production_reports_the_previous_week() {
        let period = resolve_period(PeriodKind::Week, date(2025, 6, 18), false);
        assert_eq!(period.from, date(2025, 6, 9));
        assert_eq!(period.to, date(2025, 6, 15));
    }

    #[test]
    fn test_mode_reports_the_current_week() {
        let period = resolve_period(PeriodKind::Week, date(2025, 6, 18), true);
        assert_eq!(period.from, date(2025, 6, 16));
        assert_eq!(period.to, date(2025, 6, 18));
    }
}
