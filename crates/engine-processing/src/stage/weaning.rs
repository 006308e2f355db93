use super::{Stage, StageContext, StageOutput};
use crate::{
    aggregate::{average, days_between, events_in, events_year_to_date, last_before, round1},
    error::StageError,
};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, EventKind},
};
use serde_json::json;

pub const NAME: &str = "weaning";

pub struct WeaningStage;

impl Stage for WeaningStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let week = events_in(&snapshot.events, EventKind::Weaning, &snapshot.period);
        let ytd = events_year_to_date(&snapshot.events, EventKind::Weaning, &snapshot.period);

        let piglets: u64 = week.iter().map(|e| u64::from(e.weaned)).sum();
        let ytd_piglets: u64 = ytd.iter().map(|e| u64::from(e.weaned)).sum();
        let per_litter = round1(average(week.iter().map(|e| f64::from(e.weaned))));

        // Weanings without a recorded farrowing (fostered litters) are left out.
        let lactation_days: Vec<f64> = week
            .iter()
            .filter_map(|w| {
                last_before(&snapshot.events, &w.pig_no, EventKind::Farrowing, w.date)
                    .map(|f| days_between(f.date, w.date) as f64)
            })
            .collect();
        let avg_lactation = round1(average(lactation_days.iter().copied()));

        let mut out = StageOutput::new();
        out.field("weaning_litters", week.len() as u64)
            .field("weaning_piglets", piglets)
            .field("weaning_avg_per_litter", per_litter)
            .field("weaning_avg_lactation_days", avg_lactation)
            .field("weaning_ytd_litters", ytd.len() as u64)
            .field("weaning_ytd_piglets", ytd_piglets);

        out.detail(ReportDetail::new(
            NAME,
            "summary",
            1,
            json!({
                "litters": week.len(),
                "piglets": piglets,
                "avg_per_litter": per_litter,
                "avg_lactation_days": avg_lactation,
                "with_farrowing": lactation_days.len(),
            }),
        ));

        Ok(out)
    }
}
