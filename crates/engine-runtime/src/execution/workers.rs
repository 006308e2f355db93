use crate::error::BatchError;
use engine_core::{
    context::RunContext,
    metrics::RunCounters,
    state::{Outcome, ReportStore},
};
use engine_processing::{
    error::{PipelineError, StageError},
    pipeline::{EntityOutcome, EntityPipeline},
};
use futures::FutureExt;
use model::core::identifiers::{FarmId, RunId};
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of fanning a run out over its farms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub dispatched: usize,
    pub cancelled: usize,
}

impl Dispatch {
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }
}

/// Runs one pipeline per farm on at most `workers` concurrent tasks.
///
/// Every outcome, including farms skipped after cancellation, is sent over a
/// channel to a single collector task. That task is the only writer of the
/// run counters, so each farm bumps exactly one counter exactly once.
pub async fn spawn(
    pipeline: Arc<EntityPipeline>,
    run: &RunContext,
    farms: &[FarmId],
    workers: usize,
    store: Arc<dyn ReportStore>,
    counters: RunCounters,
    cancel: CancellationToken,
) -> Result<Dispatch, BatchError> {
    let workers = workers.max(1);
    info!(run_id = %run.run_id, farms = farms.len(), workers, "Launching workers");

    let (tx, rx) = mpsc::channel::<EntityOutcome>(workers * 2);
    let collector = tokio::spawn(collect_outcomes(
        rx,
        store,
        run.run_id,
        farms.len() as u64,
        counters.clone(),
    ));

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    let mut dispatch = Dispatch {
        dispatched: 0,
        cancelled: 0,
    };

    for (idx, &farm) in farms.iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            let remaining = &farms[idx..];
            warn!(
                run_id = %run.run_id,
                dispatched = idx,
                remaining = remaining.len(),
                "Shutdown requested, remaining farms are not dispatched"
            );
            for &farm in remaining {
                let outcome = pipeline.record_cancelled(&run.for_farm(farm)).await;
                if tx.send(outcome).await.is_err() {
                    error!(%farm, "Outcome collector stopped early");
                }
            }
            dispatch.cancelled = remaining.len();
            break;
        };

        counters.increment_dispatched();
        dispatch.dispatched += 1;

        let pipeline = Arc::clone(&pipeline);
        let ctx = run.for_farm(farm);
        let tx = tx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = AssertUnwindSafe(pipeline.execute(&ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(%farm, "Pipeline task panicked");
                    EntityOutcome::failed(
                        farm,
                        None,
                        PipelineError::Stage(StageError::new("pipeline", "pipeline task panicked")),
                    )
                });
            if tx.send(outcome).await.is_err() {
                error!(%farm, "Outcome collector stopped early");
            }
        });
    }
    drop(tx);

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "Worker task failed");
        }
    }

    collector.await?;
    Ok(dispatch)
}

/// Drains outcomes until every sender is gone. Store write failures are
/// logged; the finalize check reports any resulting imbalance.
async fn collect_outcomes(
    mut rx: mpsc::Receiver<EntityOutcome>,
    store: Arc<dyn ReportStore>,
    run_id: RunId,
    target: u64,
    counters: RunCounters,
) {
    while let Some(outcome) = rx.recv().await {
        match outcome.outcome {
            Outcome::Complete => counters.increment_completed(),
            Outcome::Error => counters.increment_failed(),
        }
        counters.add_stages(outcome.stages_run);
        counters.add_rows(outcome.rows_loaded);

        let progress = format!("{}/{target}", counters.snapshot().finished());
        match &outcome.error {
            None => info!(
                %run_id,
                farm = %outcome.farm_id,
                stages = outcome.stages_run,
                %progress,
                "Farm complete"
            ),
            Some(err) => warn!(
                %run_id,
                farm = %outcome.farm_id,
                code = err.code(),
                error = %err,
                %progress,
                "Farm failed"
            ),
        }

        if let Err(err) = store.record_outcome(run_id, outcome.outcome).await {
            error!(%run_id, farm = %outcome.farm_id, error = %err, "Failed to count farm outcome");
        }
    }
}
