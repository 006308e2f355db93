use chrono::{DateTime, NaiveDate, Utc};
use model::{core::identifiers::FarmId, period::ReportPeriod};
use serde::Serialize;

/// What a run would do, computed without touching the report store.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DryRunReport {
    pub engine_version: String,
    pub generated_at: DateTime<Utc>,
    pub reference_date: NaiveDate,
    pub period: ReportPeriod,
    /// e.g. `2025-W25`
    pub week_label: String,
    pub selected_farms: Vec<FarmId>,
    /// Farms requested explicitly but not eligible or excluded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_farms: Vec<FarmId>,
    pub stages: Vec<String>,
}

impl DryRunReport {
    pub fn new(
        reference_date: NaiveDate,
        period: ReportPeriod,
        selected_farms: Vec<FarmId>,
        skipped_farms: Vec<FarmId>,
        stages: Vec<String>,
    ) -> Self {
        DryRunReport {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            reference_date,
            week_label: format!("{}-W{:02}", period.year, period.week_no),
            period,
            selected_farms,
            skipped_farms,
            stages,
        }
    }

    pub fn target_count(&self) -> usize {
        self.selected_farms.len()
    }
}
