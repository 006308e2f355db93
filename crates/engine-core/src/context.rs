use model::{
    core::{
        identifiers::{FarmId, RunId},
        value::Value,
    },
    period::ReportPeriod,
};
use std::{collections::BTreeMap, sync::Arc};

/// Values computed once per run before dispatch, shared read-only by every
/// farm pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedValues {
    /// National reference carcass price (won/kg) for the period; 0 when unknown.
    pub national_price: i64,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub period: ReportPeriod,
    pub shared: Arc<SharedValues>,
}

impl RunContext {
    pub fn new(run_id: RunId, period: ReportPeriod, shared: SharedValues) -> Self {
        RunContext {
            run_id,
            period,
            shared: Arc::new(shared),
        }
    }

    /// Narrows the run context to one farm.
    pub fn for_farm(&self, farm_id: FarmId) -> EntityContext {
        EntityContext {
            run_id: self.run_id,
            farm_id,
            period: self.period,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// What one farm pipeline hands to its stages, next to the fields already
/// produced by earlier stages.
#[derive(Debug, Clone)]
pub struct EntityContext {
    pub run_id: RunId,
    pub farm_id: FarmId,
    pub period: ReportPeriod,
    pub shared: Arc<SharedValues>,
}
