#[cfg(test)]
mod tests {
    use crate::utils::{
        FixtureSource, Harness, date, failing_registry, report_period, settings, window,
    };
    use engine_core::progress::StatusService;
    use engine_processing::stage::{StageRegistry, mating::MatingStage};
    use model::{
        core::identifiers::FarmId,
        period::{PeriodKind, ReportPeriod},
        records::{
            job_log::{JobStatus, PIPELINE_STAGE},
            report::ReportStatus,
            run::RunStatus,
        },
    };
    use std::{collections::BTreeSet, sync::Arc};
    use tracing_test::traced_test;

    fn stage_set(details: &[model::records::report::ReportDetail]) -> BTreeSet<String> {
        details.iter().map(|d| d.stage.clone()).collect()
    }

    // Eligibility as of 2025-06-15:
    // farm 1 inside its window, farm 2 before start, farm 3 stopped early,
    // farm 4 without dates.
    #[traced_test]
    #[tokio::test]
    async fn only_eligible_farms_are_dispatched() {
        let mut source = FixtureSource::new()
            .with_window(window(1, Some(date(2025, 1, 1)), Some(date(2025, 12, 31)), None))
            .with_window(window(2, Some(date(2025, 7, 1)), Some(date(2025, 12, 31)), None))
            .with_window(window(
                3,
                Some(date(2025, 1, 1)),
                Some(date(2025, 12, 31)),
                Some(date(2025, 6, 1)),
            ))
            .with_window(window(4, None, None, None));
        for farm in 1..=4 {
            source
                .farms
                .insert(FarmId(farm), crate::utils::farm_snapshot(farm));
        }
        let harness = Harness::new(source);

        let summary = harness
            .orchestrator(settings(2))
            .run(PeriodKind::Week, date(2025, 6, 15), None)
            .await
            .unwrap();

        assert_eq!(summary.run.target_count, 1);
        assert_eq!(summary.run.complete_count, 1);
        assert_eq!(summary.run.status, RunStatus::Complete);

        let touched: BTreeSet<FarmId> = harness
            .store
            .job_logs(summary.run.id)
            .await
            .unwrap()
            .iter()
            .filter_map(|e| e.farm_id)
            .collect();
        assert_eq!(touched, BTreeSet::from([FarmId(1)]));
        assert!(logs_contain("Farms resolved"));
    }

    // Three eligible farms, the fourth stage throws for farm 2.
    #[traced_test]
    #[tokio::test]
    async fn stage_failure_is_counted_and_recorded() {
        let source = FixtureSource::new()
            .with_farm(1)
            .with_farm(2)
            .with_farm(3)
            .with_price(10, 5000.0);
        let harness = Harness::new(source);
        let stages = failing_registry(Arc::new(MatingStage), 2, "injected mating failure");
        assert_eq!(stages.names()[3], "mating");

        let summary = harness
            .orchestrator(settings(3))
            .with_stages(stages)
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();

        assert_eq!(summary.run.target_count, 3);
        assert_eq!(summary.run.complete_count, 2);
        assert_eq!(summary.run.error_count, 1);
        assert_eq!(summary.run.status, RunStatus::Error);
        assert!(summary.run.ended_at.is_some());

        let status = StatusService::new(Arc::clone(&harness.store));
        let period = report_period();

        let failed = status.entity_report(FarmId(2), &period).await.unwrap();
        assert_eq!(failed.report.status, ReportStatus::Error);
        assert_eq!(failed.report.error_stage.as_deref(), Some("mating"));
        assert!(
            failed
                .report
                .error_message
                .as_deref()
                .unwrap_or_default()
                .contains("injected mating failure")
        );
        // Stages before the failure keep their details.
        assert_eq!(
            stage_set(&failed.details),
            BTreeSet::from([
                "configuration".to_string(),
                "alert".to_string(),
                "status_summary".to_string(),
            ])
        );

        let all_stages: BTreeSet<String> = StageRegistry::standard().names().into_iter().collect();
        for farm in [1, 3] {
            let view = status.entity_report(FarmId(farm), &period).await.unwrap();
            assert_eq!(view.report.status, ReportStatus::Complete);
            assert_eq!(view.report.farm_name.as_deref(), Some(format!("Farm {farm}").as_str()));
            assert_eq!(stage_set(&view.details), all_stages);
        }

        let run_status = status.run_status(summary.run.id).await.unwrap();
        assert_eq!(run_status.failures.len(), 1);
        assert_eq!(run_status.failures[0].farm_id, Some(FarmId(2)));
        assert_eq!(run_status.failures[0].error_code.as_deref(), Some("STAGE_FAILED"));
        assert!(logs_contain("Farm failed"));
    }

    #[traced_test]
    #[tokio::test]
    async fn failing_farm_does_not_change_other_results() {
        let harness = Harness::new(FixtureSource::new().with_farm(1).with_farm(2));
        let status = StatusService::new(Arc::clone(&harness.store));
        let period = report_period();

        harness
            .orchestrator(settings(2))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        let clean = status.entity_report(FarmId(1), &period).await.unwrap();

        harness
            .orchestrator(settings(2))
            .with_stages(failing_registry(Arc::new(MatingStage), 2, "boom"))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        let after = status.entity_report(FarmId(1), &period).await.unwrap();

        assert_eq!(after.report.status, ReportStatus::Complete);
        assert_eq!(after.report.fields, clean.report.fields);
        assert_eq!(after.details, clean.details);
        assert_ne!(after.report.run_id, clean.report.run_id);
    }

    #[traced_test]
    #[tokio::test]
    async fn unreadable_farm_errors_before_any_stage() {
        let source = FixtureSource::new().with_farm(1).with_farm(2).with_broken(2);
        let harness = Harness::new(source);

        let summary = harness
            .orchestrator(settings(2))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();
        assert_eq!(summary.run.complete_count, 1);
        assert_eq!(summary.run.error_count, 1);

        let jobs = harness.store.job_logs(summary.run.id).await.unwrap();
        let farm2: Vec<_> = jobs.iter().filter(|e| e.farm_id == Some(FarmId(2))).collect();
        assert_eq!(farm2.len(), 1);
        assert_eq!(farm2[0].stage, PIPELINE_STAGE);
        assert_eq!(farm2[0].status, JobStatus::Error);
        assert_eq!(farm2[0].error_code.as_deref(), Some("DATA_UNAVAILABLE"));

        let report = harness
            .store
            .load_report(FarmId(2), &report_period())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.status, ReportStatus::Error);
        assert!(harness.store.load_details(report.id).await.unwrap().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn stage_order_is_stable_across_runs() {
        let harness = Harness::new(FixtureSource::new().with_farm(1));
        let orchestrator = harness.orchestrator(settings(1));

        let mut orders = Vec::new();
        for _ in 0..2 {
            let summary = orchestrator
                .run(PeriodKind::Week, date(2025, 6, 18), None)
                .await
                .unwrap();
            let stages: Vec<String> = harness
                .store
                .job_logs(summary.run.id)
                .await
                .unwrap()
                .into_iter()
                .filter(|e| e.stage != PIPELINE_STAGE)
                .map(|e| e.stage)
                .collect();
            orders.push(stages);
        }

        assert_eq!(orders[0], StageRegistry::standard().names());
        assert_eq!(orders[0], orders[1]);
    }

    #[traced_test]
    #[tokio::test]
    async fn national_price_reaches_the_shipment_stage() {
        let source = FixtureSource::new()
            .with_farm(1)
            .with_price(100, 5000.0)
            .with_price(300, 5400.0);
        let harness = Harness::new(source);

        harness
            .orchestrator(settings(1))
            .run(PeriodKind::Week, date(2025, 6, 18), None)
            .await
            .unwrap();

        let report = harness
            .store
            .load_report(FarmId(1), &ReportPeriod::previous_week(date(2025, 6, 18)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            report.field("ship_national_price").and_then(|v| v.as_i64()),
            Some(5300)
        );
    }
}
