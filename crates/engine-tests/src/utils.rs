use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use connectors::error::DbError;
use engine_config::settings::{EngineSettings, RetrySettings, StoreSettings};
use engine_core::state::{ReportStore, sled_store::SledReportStore};
use engine_processing::{
    aggregate::ReferencePrice,
    error::StageError,
    source::FarmSource,
    stage::{Stage, StageContext, StageOutput, StageRegistry},
};
use engine_runtime::execution::executor::BatchOrchestrator;
use model::{
    core::identifiers::FarmId,
    period::ReportPeriod,
    records::service::ServiceWindow,
    snapshot::{
        ConfigEntry, EntitySnapshot, EventKind, FarmInfo, OutKind, ShipmentRecord, SowRecord,
        SowState, WorkEvent,
    },
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Wednesday; the scheduled run reports 2025-06-09 .. 2025-06-15.
pub fn reference() -> NaiveDate {
    date(2025, 6, 18)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn report_period() -> ReportPeriod {
    ReportPeriod::previous_week(reference())
}

pub fn window(
    farm: i64,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    stop: Option<NaiveDate>,
) -> ServiceWindow {
    ServiceWindow {
        farm_id: FarmId(farm),
        registered_on: Some(date(2024, 12, 1)),
        start,
        end,
        stop,
        service_enabled: true,
        record_active: true,
    }
}

/// Service for the whole of 2025.
pub fn open_window(farm: i64) -> ServiceWindow {
    window(farm, Some(date(2025, 1, 1)), Some(date(2025, 12, 31)), None)
}

fn sow(pig_no: &str, state: SowState, since: NaiveDate, parity: u32) -> SowRecord {
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

fn work(pig_no: &str, kind: EventKind, on: NaiveDate, parity: u32) -> WorkEvent {
    WorkEvent {
        pig_no: pig_no.to_string(),
        kind,
        date: on,
        parity,
        live: 0,
        dead: 0,
        mummy: 0,
        weaned: 0,
        reason: None,
    }
}

/// A small but complete farm: every stage has something to aggregate.
pub fn farm_snapshot(farm: i64) -> EntitySnapshot {
    let period = report_period();

    let mut culled = sow("S5", SowState::Culled, date(2025, 6, 11), 6);
    culled.out_on = Some(date(2025, 6, 11));
    culled.out_kind = Some(OutKind::Cull);
    culled.out_reason = Some("leg".to_string());

    let farrowing = WorkEvent {
        live: 11,
        dead: 1,
        mummy: 1,
        ..work("S2", EventKind::Farrowing, date(2025, 6, 10), 2)
    };
    let weaning = WorkEvent {
        weaned: 10,
        ..work("S3", EventKind::Weaning, date(2025, 6, 12), 4)
    };
    let accident = WorkEvent {
        reason: Some("return".to_string()),
        ..work("S7", EventKind::Accident, date(2025, 6, 14), 1)
    };

    EntitySnapshot {
        farm: FarmInfo {
            farm_id: FarmId(farm),
            name: format!("Farm {farm}"),
            owner: Some("Owner".to_string()),
            region_code: Some("41".to_string()),
            locale: "ko".to_string(),
        },
        period,
        history_from: date(2024, 7, 5),
        config: vec![ConfigEntry {
            code: "gestation_days".to_string(),
            value: "114".to_string(),
        }],
        sows: vec![
            sow("S1", SowState::Gestating, date(2025, 3, 1), 3),
            sow("S2", SowState::Lactating, date(2025, 6, 10), 2),
            sow("S3", SowState::Weaned, date(2025, 6, 12), 4),
            sow("S4", SowState::Candidate, date(2025, 5, 2), 0),
            culled,
        ],
        events: vec![
            work("S1", EventKind::Mating, date(2025, 3, 1), 2),
            work("S3", EventKind::Weaning, date(2025, 5, 20), 3),
            farrowing,
            weaning,
            work("S6", EventKind::Mating, date(2025, 6, 13), 1),
            accident,
        ],
        shipments: vec![
            ShipmentRecord {
                date: date(2025, 6, 10),
                carcass_kg: 115.0,
                backfat_mm: Some(21.0),
                grade: Some("1+".to_string()),
                price_per_kg: Some(5200.0),
            },
            ShipmentRecord {
                date: date(2025, 6, 11),
                carcass_kg: 98.5,
                backfat_mm: Some(18.0),
                grade: Some("2".to_string()),
                price_per_kg: Some(4800.0),
            },
        ],
        loaded_at: Utc::now(),
    }
}

/// In-memory farm database.
#[derive(Default)]
pub struct FixtureSource {
    pub windows: Vec<ServiceWindow>,
    pub farms: BTreeMap<FarmId, EntitySnapshot>,
    pub prices: Vec<ReferencePrice>,
    /// Reads for these farms fail with a non-retryable error.
    pub broken: BTreeSet<FarmId>,
    /// The eligibility table itself cannot be read.
    pub windows_unreadable: bool,
    /// Cancelled on the first farm lookup.
    pub cancel_on_load: Option<CancellationToken>,
    pub farm_lookups: AtomicUsize,
}

impl FixtureSource {
    pub fn new() -> Self {
        FixtureSource::default()
    }

    /// An eligible farm with the standard fixture data.
    pub fn with_farm(mut self, farm: i64) -> Self {
        self.windows.push(open_window(farm));
        self.farms.insert(FarmId(farm), farm_snapshot(farm));
        self
    }

    pub fn with_window(mut self, window: ServiceWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn with_broken(mut self, farm: i64) -> Self {
        self.broken.insert(FarmId(farm));
        self
    }

    pub fn with_unreadable_windows(mut self) -> Self {
        self.windows_unreadable = true;
        self
    }

    pub fn with_price(mut self, head_count: i64, price_per_kg: f64) -> Self {
        self.prices.push(ReferencePrice {
            head_count,
            price_per_kg,
        });
        self
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_load = Some(token);
        self
    }

    fn snapshot(&self, farm: FarmId) -> Result<Option<&EntitySnapshot>, DbError> {
        if self.broken.contains(&farm) {
            return Err(DbError::Decode {
                column: "farm_no".to_string(),
                message: format!("corrupt row for farm {farm}"),
            });
        }
        Ok(self.farms.get(&farm))
    }
}

#[async_trait]
impl FarmSource for FixtureSource {
    async fn service_windows(&self) -> Result<Vec<ServiceWindow>, DbError> {
        if self.windows_unreadable {
            return Err(DbError::Decode {
                column: "svc_start_dt".to_string(),
                message: "corrupt service window table".to_string(),
            });
        }
        Ok(self.windows.clone())
    }

    async fn farm_info(&self, farm: FarmId) -> Result<Option<FarmInfo>, DbError> {
        self.farm_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_load {
            token.cancel();
        }
        Ok(self.snapshot(farm)?.map(|s| s.farm.clone()))
    }

    async fn config(&self, farm: FarmId) -> Result<Vec<ConfigEntry>, DbError> {
        Ok(self.snapshot(farm)?.map(|s| s.config.clone()).unwrap_or_default())
    }

    async fn sows(&self, farm: FarmId) -> Result<Vec<SowRecord>, DbError> {
        Ok(self.snapshot(farm)?.map(|s| s.sows.clone()).unwrap_or_default())
    }

    async fn events(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkEvent>, DbError> {
        Ok(self
            .snapshot(farm)?
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
        Ok(self
            .snapshot(farm)?
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
        Ok(self.prices.clone())
    }
}

/// Wraps a real stage and fails it for one farm only.
pub struct FailingStage {
    inner: Arc<dyn Stage>,
    farm: FarmId,
    message: String,
}

impl FailingStage {
    pub fn new(inner: Arc<dyn Stage>, farm: i64, message: &str) -> Self {
        FailingStage {
            inner,
            farm: FarmId(farm),
            message: message.to_string(),
        }
    }
}

impl Stage for FailingStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        if ctx.entity.farm_id == self.farm {
            return Err(StageError::new(self.name(), self.message.clone()));
        }
        self.inner.run(snapshot, ctx)
    }
}

/// Standard stages with `stage` failing for `farm`.
pub fn failing_registry(stage: Arc<dyn Stage>, farm: i64, message: &str) -> StageRegistry {
    let mut stages = StageRegistry::standard();
    let name = stage.name().to_string();
    let replaced = stages.replace(&name, Arc::new(FailingStage::new(stage, farm, message)));
    assert!(replaced, "unknown stage {name}");
    stages
}

pub fn settings(workers: usize) -> EngineSettings {
    EngineSettings {
        workers,
        entity_timeout_secs: Some(30),
        store: StoreSettings::Sled {
            path: "unused".into(),
        },
        source_url: None,
        retry: RetrySettings {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        exclude_farms: Vec::new(),
        wait_for_collectors: false,
    }
}

/// A sled store in a temp dir; the dir lives as long as the harness.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<dyn ReportStore>,
    pub source: Arc<FixtureSource>,
}

impl Harness {
    pub fn new(source: FixtureSource) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SledReportStore::open(dir.path().join("state")).expect("open sled store");
        Harness {
            dir,
            store: Arc::new(store),
            source: Arc::new(source),
        }
    }

    pub fn orchestrator(&self, settings: EngineSettings) -> BatchOrchestrator {
        self.orchestrator_with(settings, CancellationToken::new())
    }

    pub fn orchestrator_with(
        &self,
        settings: EngineSettings,
        cancel: CancellationToken,
    ) -> BatchOrchestrator {
        BatchOrchestrator::new(
            settings,
            Arc::clone(&self.store),
            self.source.clone(),
            cancel,
        )
    }
}
