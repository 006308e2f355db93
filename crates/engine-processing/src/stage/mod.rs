use crate::error::StageError;
use engine_core::context::EntityContext;
use model::{
    core::value::Value,
    records::report::{ReportDetail, ReportFields},
    snapshot::EntitySnapshot,
};
use std::sync::Arc;

pub mod accident;
pub mod alert;
pub mod configuration;
pub mod culling;
pub mod farrowing;
pub mod mating;
pub mod schedule;
pub mod shipment;
pub mod status_summary;
pub mod weaning;

/// What a stage sees besides the snapshot: the farm's context and every
/// field produced by the stages before it in this execution.
pub struct StageContext<'a> {
    pub entity: &'a EntityContext,
    pub fields: &'a ReportFields,
}

impl StageContext<'_> {
    /// An integer field produced by an earlier stage, or `default`.
    pub fn field_i64(&self, name: &str, default: i64) -> i64 {
        self.fields
            .get(name)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    /// An integer field an earlier stage must have produced.
    pub fn require_i64(&self, stage: &str, name: &str) -> Result<i64, StageError> {
        self.fields
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| StageError::new(stage, format!("missing field '{name}'")))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub fields: ReportFields,
    pub details: Vec<ReportDetail>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn detail(&mut self, detail: ReportDetail) -> &mut Self {
        self.details.push(detail);
        self
    }
}

/// One aggregation step of a farm pipeline. Stages are pure functions of
/// the snapshot and the context; the pipeline owns every side effect.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError>;
}

/// The ordered stage chain. Order is total and fixed per release.
#[derive(Clone)]
pub struct StageRegistry {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        StageRegistry { stages }
    }

    pub fn standard() -> Self {
        StageRegistry::new(vec![
            Arc::new(configuration::ConfigurationStage),
            Arc::new(alert::AlertStage),
            Arc::new(status_summary::StatusSummaryStage),
            Arc::new(mating::MatingStage),
            Arc::new(farrowing::FarrowingStage),
            Arc::new(weaning::WeaningStage),
            Arc::new(accident::AccidentStage),
            Arc::new(culling::CullingStage),
            Arc::new(shipment::ShipmentStage),
            Arc::new(schedule::ScheduleStage),
        ])
    }

    /// Swaps the stage registered under `name`, keeping its position.
    /// Returns false when no stage has that name.
    pub fn replace(&mut self, name: &str, stage: Arc<dyn Stage>) -> bool {
        match self.stages.iter().position(|s| s.name() == name) {
            Some(idx) => {
                self.stages[idx] = stage;
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
