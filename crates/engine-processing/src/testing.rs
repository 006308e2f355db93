//! Shared fixtures for the unit tests of this crate.

use crate::{
    aggregate::ReferencePrice,
    error::StageError,
    source::FarmSource,
    stage::{Stage, StageContext, StageOutput},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use connectors::error::DbError;
use engine_core::context::{EntityContext, RunContext, SharedValues};
use model::{
    core::identifiers::{FarmId, RunId},
    period::ReportPeriod,
    records::{report::ReportFields, service::ServiceWindow},
    snapshot::{
        ConfigEntry, EntitySnapshot, EventKind, FarmInfo, ShipmentRecord, SowRecord, SowState,
        WorkEvent,
    },
};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

/// 2025-06-09 (Mon) .. 2025-06-15 (Sun).
pub fn period() -> ReportPeriod {
    ReportPeriod::from_bounds(date(6, 9), date(6, 15)).unwrap()
}

pub fn farm(id: i64) -> FarmInfo {
    FarmInfo {
        farm_id: FarmId(id),
        name: format!("Farm {id}"),
        owner: None,
        region_code: None,
        locale: "ko".to_string(),
    }
}

pub fn snapshot() -> EntitySnapshot {
    EntitySnapshot {
        farm: farm(1),
        period: period(),
        history_from: date(1, 1),
        config: vec![],
        sows: vec![],
        events: vec![],
        shipments: vec![],
        loaded_at: Utc::now(),
    }
}

pub fn sow(pig_no: &str, state: SowState, since: NaiveDate, parity: u32) -> SowRecord {
    SowRecord {
        pig_no: pig_no.to_string(),
        parity,
        state,
        state_since: Some(since),
        out_on: None,
        out_kind: None,
        out_reason: None,
    }
}

pub fn event(pig_no: &str, kind: EventKind, date: NaiveDate, parity: u32) -> WorkEvent {
    WorkEvent {
        pig_no: pig_no.to_string(),
        kind,
        date,
        parity,
        live: 0,
        dead: 0,
        mummy: 0,
        weaned: 0,
        reason: None,
    }
}

pub fn shipment(date: NaiveDate, kg: f64, grade: &str) -> ShipmentRecord {
    ShipmentRecord {
        date,
        carcass_kg: kg,
        backfat_mm: None,
        grade: Some(grade.to_string()),
        price_per_kg: None,
    }
}

pub fn context(national_price: i64) -> EntityContext {
    RunContext::new(
        RunId(1),
        period(),
        SharedValues {
            national_price,
            extra: BTreeMap::new(),
        },
    )
    .for_farm(FarmId(1))
}

pub fn run_stage(stage: &dyn Stage, snapshot: &EntitySnapshot) -> Result<StageOutput, StageError> {
    run_stage_with(stage, snapshot, &ReportFields::new(), 0)
}

pub fn run_stage_with(
    stage: &dyn Stage,
    snapshot: &EntitySnapshot,
    fields: &ReportFields,
    national_price: i64,
) -> Result<StageOutput, StageError> {
    let entity = context(national_price);
    stage.run(snapshot, &StageContext { entity: &entity, fields })
}

/// In-memory source holding one snapshot's worth of rows per farm.
#[derive(Default)]
pub struct StubSource {
    pub windows: Vec<ServiceWindow>,
    pub farms: BTreeMap<FarmId, EntitySnapshot>,
    pub prices: Vec<ReferencePrice>,
    /// The first `failures` reads fail with a transient error.
    pub failures: usize,
    pub calls: AtomicUsize,
    /// Added to every farm lookup.
    pub delay: Option<Duration>,
}

impl StubSource {
    pub fn with_farm(snapshot: EntitySnapshot) -> Self {
        let mut source = StubSource::default();
        source.farms.insert(snapshot.farm_id(), snapshot);
        source
    }

    fn tick(&self) -> Result<(), DbError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(DbError::Unavailable("source restarting".into()))
        } else {
            Ok(())
        }
    }

    fn snapshot(&self, farm: FarmId) -> Option<&EntitySnapshot> {
        self.farms.get(&farm)
    }
}

#[async_trait]
impl FarmSource for StubSource {
    async fn service_windows(&self) -> Result<Vec<ServiceWindow>, DbError> {
        self.tick()?;
        Ok(self.windows.clone())
    }

    async fn farm_info(&self, farm: FarmId) -> Result<Option<FarmInfo>, DbError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.tick()?;
        Ok(self.snapshot(farm).map(|s| s.farm.clone()))
    }

    async fn config(&self, farm: FarmId) -> Result<Vec<ConfigEntry>, DbError> {
        self.tick()?;
        Ok(self.snapshot(farm).map(|s| s.config.clone()).unwrap_or_default())
    }

    async fn sows(&self, farm: FarmId) -> Result<Vec<SowRecord>, DbError> {
        self.tick()?;
        Ok(self.snapshot(farm).map(|s| s.sows.clone()).unwrap_or_default())
    }

    async fn events(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkEvent>, DbError> {
        self.tick()?;
        Ok(self
            .snapshot(farm)
            .map(|s| {
                s.events
                    .iter()
                    .filter(|e| from <= e.date && e.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn shipments(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ShipmentRecord>, DbError> {
        self.tick()?;
        Ok(self
            .snapshot(farm)
            .map(|s| {
                s.shipments
                    .iter()
                    .filter(|r| from <= r.date && r.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn reference_prices(
        &self,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<ReferencePrice>, DbError> {
        self.tick()?;
        Ok(self.prices.clone())
    }
}
