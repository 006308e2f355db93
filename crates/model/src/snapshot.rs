use crate::{core::identifiers::FarmId, period::ReportPeriod};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmInfo {
    pub farm_id: FarmId,
    pub name: String,
    pub owner: Option<String>,
    pub region_code: Option<String>,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub code: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SowState {
    /// Replacement gilt, never mated.
    Candidate,
    Gestating,
    Lactating,
    Weaned,
    /// Pregnancy failed; waiting to be re-mated.
    Open,
    Culled,
}

impl SowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SowState::Candidate => "candidate",
            SowState::Gestating => "gestating",
            SowState::Lactating => "lactating",
            SowState::Weaned => "weaned",
            SowState::Open => "open",
            SowState::Culled => "culled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "candidate" => Some(SowState::Candidate),
            "gestating" => Some(SowState::Gestating),
            "lactating" => Some(SowState::Lactating),
            "weaned" => Some(SowState::Weaned),
            "open" => Some(SowState::Open),
            "culled" => Some(SowState::Culled),
            _ => None,
        }
    }
}

/// Why a sow left the herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutKind {
    Cull,
    Death,
    Transfer,
    Sale,
}

impl OutKind {
    pub const ORDER: [OutKind; 4] = [OutKind::Cull, OutKind::Death, OutKind::Transfer, OutKind::Sale];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutKind::Cull => "cull",
            OutKind::Death => "death",
            OutKind::Transfer => "transfer",
            OutKind::Sale => "sale",
        }
    }

    /// Accepts both the names above and the legacy `08000x` codes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cull" | "080001" => Some(OutKind::Cull),
            "death" | "080002" => Some(OutKind::Death),
            "transfer" | "080003" => Some(OutKind::Transfer),
            "sale" | "080004" => Some(OutKind::Sale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SowRecord {
    pub pig_no: String,
    pub parity: u32,
    pub state: SowState,
    /// Date of the event that put the sow in `state`.
    pub state_since: Option<NaiveDate>,
    pub out_on: Option<NaiveDate>,
    pub out_kind: Option<OutKind>,
    pub out_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Mating,
    Farrowing,
    Weaning,
    Accident,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Mating => "mating",
            EventKind::Farrowing => "farrowing",
            EventKind::Weaning => "weaning",
            EventKind::Accident => "accident",
        }
    }

    /// Accepts the names above and the legacy single-letter work codes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mating" | "g" => Some(EventKind::Mating),
            "farrowing" | "b" => Some(EventKind::Farrowing),
            "weaning" | "e" => Some(EventKind::Weaning),
            "accident" | "f" => Some(EventKind::Accident),
            _ => None,
        }
    }
}

/// One sow work record (mating, farrowing, weaning or accident).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkEvent {
    pub pig_no: String,
    pub kind: EventKind,
    pub date: NaiveDate,
    pub parity: u32,
    pub live: u32,
    pub dead: u32,
    pub mummy: u32,
    pub weaned: u32,
    pub reason: Option<String>,
}

impl WorkEvent {
    pub fn total_born(&self) -> u32 {
        self.live + self.dead + self.mummy
    }
}

/// One carcass from the slaughterhouse grading feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub date: NaiveDate,
    pub carcass_kg: f64,
    pub backfat_mm: Option<f64>,
    pub grade: Option<String>,
    pub price_per_kg: Option<f64>,
}

/// Everything the stages read for one farm, loaded once per pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub farm: FarmInfo,
    pub period: ReportPeriod,
    /// Earliest event date included in `events`.
    pub history_from: NaiveDate,
    pub config: Vec<ConfigEntry>,
    pub sows: Vec<SowRecord>,
    pub events: Vec<WorkEvent>,
    pub shipments: Vec<ShipmentRecord>,
    pub loaded_at: DateTime<Utc>,
}

impl EntitySnapshot {
    pub fn farm_id(&self) -> FarmId {
        self.farm.farm_id
    }

    pub fn config_value(&self, code: &str) -> Option<&str> {
        self.config
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .map(|c| c.value.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.config.len() + self.sows.len() + self.events.len() + self.shipments.len()
    }
}
