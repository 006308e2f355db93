use crate::{error::SnapshotError, retry::classify_db_error, source::FarmSource};
use chrono::{Duration, NaiveDate, Utc};
use connectors::error::DbError;
use engine_core::retry::RetryPolicy;
use model::{core::identifiers::FarmId, period::ReportPeriod, snapshot::EntitySnapshot};
use std::{future::Future, sync::Arc};
use tracing::debug;

/// How far before January 1st work events are loaded, so that the first
/// matings of the year can still find the weaning that preceded them.
pub const HISTORY_LOOKBACK_DAYS: i64 = 180;

/// Loads everything the registered stages read for one farm, once.
/// The read set is fixed and versioned together with the stage set.
pub struct SnapshotLoader {
    source: Arc<dyn FarmSource>,
    retry: RetryPolicy,
}

impl SnapshotLoader {
    pub fn new(source: Arc<dyn FarmSource>, retry: RetryPolicy) -> Self {
        SnapshotLoader { source, retry }
    }

    pub fn history_from(period: &ReportPeriod) -> NaiveDate {
        period.year_start().min(period.from) - Duration::days(HISTORY_LOOKBACK_DAYS)
    }

    pub async fn load(
        &self,
        farm: FarmId,
        period: &ReportPeriod,
    ) -> Result<EntitySnapshot, SnapshotError> {
        let info = self
            .read(farm, "farm_info", || self.source.farm_info(farm))
            .await?
            .ok_or_else(|| SnapshotError::DataUnavailable {
                farm,
                reason: "farm not found".to_string(),
            })?;

        let history_from = Self::history_from(period);
        let year_start = period.year_start().min(period.from);

        let config = self
            .read(farm, "config", || self.source.config(farm))
            .await?;
        let sows = self.read(farm, "sows", || self.source.sows(farm)).await?;
        let events = self
            .read(farm, "events", || {
                self.source.events(farm, history_from, period.to)
            })
            .await?;
        let shipments = self
            .read(farm, "shipments", || {
                self.source.shipments(farm, year_start, period.to)
            })
            .await?;

        let snapshot = EntitySnapshot {
            farm: info,
            period: *period,
            history_from,
            config,
            sows,
            events,
            shipments,
            loaded_at: Utc::now(),
        };
        debug!(%farm, rows = snapshot.row_count(), "Snapshot loaded");
        Ok(snapshot)
    }

    async fn read<T, F, Fut>(&self, farm: FarmId, label: &str, op: F) -> Result<T, SnapshotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        self.retry
            .run(label, op, classify_db_error)
            .await
            .map_err(|e| SnapshotError::DataUnavailable {
                farm,
                reason: format!("{label}: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubSource, date, event, period, snapshot};
    use model::snapshot::EventKind;
    use std::time::Duration as StdDuration;

    #[test]
    fn history_reaches_before_january() {
        assert_eq!(
            SnapshotLoader::history_from(&period()),
            NaiveDate::from_ymd_opt(2024, 7, 5).unwrap()
        );
    }

    #[tokio::test]
    async fn loads_events_inside_the_history_window() {
        let mut snap = snapshot();
        snap.events = vec![
            event("A", EventKind::Mating, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 1),
            event("A", EventKind::Weaning, date(6, 2), 1),
            event("A", EventKind::Mating, date(6, 20), 2),
        ];
        let loader = SnapshotLoader::new(
            Arc::new(StubSource::with_farm(snap)),
            RetryPolicy::none(),
        );

        let loaded = loader.load(FarmId(1), &period()).await.unwrap();
        assert_eq!(loaded.events.len(), 1);
        assert_eq!(loaded.farm.name, "Farm 1");
    }

    #[tokio::test]
    async fn exhausted_retries_are_data_unavailable() {
        let mut source = StubSource::with_farm(snapshot());
        source.failures = 10;
        let loader = SnapshotLoader::new(
            Arc::new(source),
            RetryPolicy::new(2, StdDuration::ZERO, StdDuration::ZERO),
        );

        let err = loader.load(FarmId(1), &period()).await.unwrap_err();
        let SnapshotError::DataUnavailable { farm, reason } = err;
        assert_eq!(farm, FarmId(1));
        assert!(reason.starts_with("farm_info"));
    }
}
