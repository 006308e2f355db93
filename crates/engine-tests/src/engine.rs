#[cfg(test)]
mod tests {
    use crate::utils::{FixtureSource, Harness, date, report_period, settings, window};
    use async_trait::async_trait;
    use engine_processing::error::SelectionError;
    use engine_runtime::{
        error::{BatchError, CollectorError},
        execution::{collectors::UpstreamCollector, executor::RunOptions},
    };
    use model::{
        core::identifiers::FarmId,
        period::{PeriodKind, ReportPeriod},
        records::{
            job_log::{JobStatus, PIPELINE_STAGE},
            report::ReportStatus,
            run::RunStatus,
        },
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn rerunning_a_farm_keeps_one_current_report() {
        let harness = Harness::new(FixtureSource::new().with_farm(7));
        let orchestrator = harness.orchestrator(settings(1));
        let period = report_period();

        let first = orchestrator.run_single(FarmId(7), period).await.unwrap();
        let first_report = harness
            .store
            .load_report(FarmId(7), &period)
            .await
            .unwrap()
            .unwrap();

        let second = orchestrator.run_single(FarmId(7), period).await.unwrap();
        let second_report = harness
            .store
            .load_report(FarmId(7), &period)
            .await
            .unwrap()
            .unwrap();

        assert!(second.run.id > first.run.id);
        assert_eq!(second.run.target_count, 1);
        assert_eq!(second.run.complete_count, 1);
        assert_eq!(second_report.run_id, second.run.id);
        assert_eq!(second_report.share_token, first_report.share_token);
        assert_eq!(second_report.status, ReportStatus::Complete);

        // The superseded report's details are gone, the new ones are complete.
        assert_ne!(second_report.id, first_report.id);
        assert!(
            harness
                .store
                .load_details(first_report.id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(!harness.store.load_details(second_report.id).await.unwrap().is_empty());

        // Each run has its own job log.
        for run in [first.run.id, second.run.id] {
            let jobs = harness.store.job_logs(run).await.unwrap();
            assert_eq!(jobs.len(), 11);
            assert!(jobs.iter().all(|j| j.status == JobStatus::Success));
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn single_run_of_an_unknown_farm_is_data_unavailable() {
        let harness = Harness::new(FixtureSource::new().with_farm(1));
        let summary = harness
            .orchestrator(settings(1))
            .run_single(FarmId(404), report_period())
            .await
            .unwrap();

        assert_eq!(summary.run.target_count, 1);
        assert_eq!(summary.run.error_count, 1);
        assert_eq!(summary.run.status, RunStatus::Error);
        assert!(!summary.is_clean());

        let jobs = harness.store.job_logs(summary.run.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].error_code.as_deref(), Some("DATA_UNAVAILABLE"));
    }

    #[traced_test]
    #[tokio::test]
    async fn single_run_leaves_batch_counters_alone() {
        let harness = Harness::new(FixtureSource::new().with_farm(1).with_farm(2));
        let orchestrator = harness.orchestrator(settings(2));

        let batch = orchestrator
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        orchestrator
            .run_single(FarmId(1), report_period())
            .await
            .unwrap();

        let reloaded = harness.store.load_run(batch.run.id).await.unwrap().unwrap();
        assert_eq!(reloaded.target_count, 2);
        assert_eq!(reloaded.complete_count, 2);
        assert_eq!(reloaded.error_count, 0);
    }

    #[traced_test]
    #[tokio::test]
    async fn counters_balance_under_concurrency() {
        let mut source = FixtureSource::new();
        for farm in 1..=24 {
            source = source.with_farm(farm);
        }
        let source = source.with_broken(5).with_broken(17);
        let harness = Harness::new(source);

        let summary = harness
            .orchestrator(settings(6))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();

        assert_eq!(summary.run.target_count, 24);
        assert_eq!(summary.run.complete_count, 22);
        assert_eq!(summary.run.error_count, 2);
        assert!(summary.run.is_balanced());
        assert_eq!(summary.stages_run, 22 * 10);
    }

    #[traced_test]
    #[tokio::test]
    async fn explicit_list_and_exclusions_narrow_the_run() {
        let source = FixtureSource::new().with_farm(1).with_farm(2).with_farm(3);
        let harness = Harness::new(source);
        let mut settings = settings(2);
        settings.exclude_farms = vec![FarmId(3)];

        let summary = harness
            .orchestrator(settings)
            .run(
                PeriodKind::Week,
                date(2025, 6, 18),
                Some(&[FarmId(2), FarmId(3), FarmId(99)]),
            )
            .await
            .unwrap();

        assert_eq!(summary.run.target_count, 1);
        assert!(
            harness
                .store
                .load_report(FarmId(1), &report_period())
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            harness
                .store
                .load_report(FarmId(2), &report_period())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn cancellation_stops_dispatch_but_accounts_for_every_farm() {
        let cancel = CancellationToken::new();
        let source = FixtureSource::new()
            .with_farm(1)
            .with_farm(2)
            .with_farm(3)
            .cancelling(cancel.clone());
        let harness = Harness::new(source);

        let summary = harness
            .orchestrator_with(settings(1), cancel)
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();

        assert_eq!(summary.run.status, RunStatus::Cancelled);
        assert_eq!(summary.run.target_count, 3);
        assert_eq!(summary.run.complete_count, 1);
        assert_eq!(summary.run.error_count, 2);
        assert_eq!(harness.source.farm_lookups.load(Ordering::SeqCst), 1);

        // The in-flight farm finished; the others only have a job log entry.
        let period = report_period();
        let done = harness.store.load_report(FarmId(1), &period).await.unwrap();
        assert_eq!(done.map(|r| r.status), Some(ReportStatus::Complete));
        for farm in [2, 3] {
            assert!(harness.store.load_report(FarmId(farm), &period).await.unwrap().is_none());
        }
        let cancelled = harness
            .store
            .job_logs(summary.run.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.error_code.as_deref() == Some("CANCELLED"))
            .count();
        assert_eq!(cancelled, 2);
        assert!(logs_contain("remaining farms are not dispatched"));
    }

    #[traced_test]
    #[tokio::test]
    async fn inverted_window_skips_only_its_farm() {
        let source = FixtureSource::new().with_farm(1).with_window(window(
            2,
            Some(date(2025, 12, 31)),
            Some(date(2025, 1, 1)),
            None,
        ));
        let harness = Harness::new(source);
        let orchestrator = harness.orchestrator(settings(1));

        let summary = orchestrator
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        assert_eq!(summary.run.status, RunStatus::Complete);
        assert_eq!(summary.run.target_count, 1);
        assert_eq!(summary.run.complete_count, 1);

        let explicit = [FarmId(1), FarmId(2)];
        let summary = orchestrator
            .run(PeriodKind::Week, date(2025, 6, 18), Some(&explicit))
            .await
            .unwrap();
        assert_eq!(summary.run.target_count, 1);
        assert!(logs_contain("Service window ends before it starts"));
    }

    #[traced_test]
    #[tokio::test]
    async fn unreadable_windows_abort_the_run() {
        let harness = Harness::new(FixtureSource::new().with_farm(1).with_unreadable_windows());

        let err = harness
            .orchestrator(settings(1))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::Selection(SelectionError::Source(_))
        ));

        let runs = harness.store.recent_runs(1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Error);
        assert_eq!(runs[0].target_count, 0);
        assert!(harness.store.job_logs(runs[0].id).await.unwrap().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let source = FixtureSource::new()
            .with_farm(1)
            .with_farm(2)
            .with_window(window(3, Some(date(2025, 7, 1)), Some(date(2025, 12, 31)), None));
        let harness = Harness::new(source);

        let report = harness
            .orchestrator(settings(1))
            .dry_run(
                PeriodKind::Week,
                date(2025, 6, 18),
                Some(&[FarmId(1), FarmId(3)]),
            )
            .await
            .unwrap();

        assert_eq!(report.selected_farms, vec![FarmId(1)]);
        assert_eq!(report.skipped_farms, vec![FarmId(3)]);
        assert_eq!(report.week_label, "2025-W25");
        assert_eq!(report.stages.len(), 10);
        assert!(harness.store.recent_runs(10).await.unwrap().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_mode_reports_the_current_week() {
        let harness = Harness::new(FixtureSource::new().with_farm(1));
        let summary = harness
            .orchestrator(settings(1))
            .with_options(RunOptions {
                test_mode: true,
                skip_collectors: false,
            })
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();

        assert_eq!(
            summary.run.period,
            ReportPeriod::current_week(date(2025, 6, 18))
        );
        assert_eq!(summary.run.reference_date, date(2025, 6, 18));
    }

    struct Feed {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl UpstreamCollector for Feed {
        fn name(&self) -> &str {
            "grading-feed"
        }

        async fn collect(&self, _period: &ReportPeriod) -> Result<u64, CollectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CollectorError::new("grading-feed", "timeout"))
            } else {
                Ok(3)
            }
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn collectors_run_first_and_never_abort() {
        let harness = Harness::new(FixtureSource::new().with_farm(1));
        let feed = Arc::new(Feed {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let mut settings = settings(1);
        settings.wait_for_collectors = true;

        let summary = harness
            .orchestrator(settings.clone())
            .with_collector(feed.clone())
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        assert_eq!(summary.run.status, RunStatus::Complete);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Collector failed, continuing"));

        harness
            .orchestrator(settings)
            .with_collector(feed.clone())
            .with_options(RunOptions {
                test_mode: false,
                skip_collectors: true,
            })
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn pipeline_job_is_closed_for_every_farm() {
        let harness = Harness::new(FixtureSource::new().with_farm(1).with_farm(2));
        let summary = harness
            .orchestrator(settings(2))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();

        let jobs = harness.store.job_logs(summary.run.id).await.unwrap();
        let pipeline_jobs: Vec<_> = jobs.iter().filter(|j| j.stage == PIPELINE_STAGE).collect();
        assert_eq!(pipeline_jobs.len(), 2);
        assert!(pipeline_jobs.iter().all(|j| j.ended_at.is_some()));
        assert!(pipeline_jobs.iter().all(|j| j.processed_count == 10));
    }
}
