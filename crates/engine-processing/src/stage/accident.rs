use super::{Stage, StageContext, StageOutput};
use crate::{
    aggregate::{
        average, days_between, events_in, events_year_to_date, group_count, last_before, round1,
    },
    error::StageError,
};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, EventKind},
};
use serde_json::json;

pub const NAME: &str = "accident";

const UNKNOWN_REASON: &str = "unknown";

/// Pregnancy accidents (returns, abortions, empty checks) by reason.
pub struct AccidentStage;

impl Stage for AccidentStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let week = events_in(&snapshot.events, EventKind::Accident, &snapshot.period);
        let ytd = events_year_to_date(&snapshot.events, EventKind::Accident, &snapshot.period);

        let after_mating: Vec<f64> = week
            .iter()
            .filter_map(|a| {
                last_before(&snapshot.events, &a.pig_no, EventKind::Mating, a.date)
                    .map(|m| days_between(m.date, a.date) as f64)
            })
            .collect();

        let reason_of = |reason: &Option<String>| {
            reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(UNKNOWN_REASON)
                .to_string()
        };
        let week_by_reason = group_count(week.iter(), |a| reason_of(&a.reason));
        let ytd_by_reason = group_count(ytd.iter(), |a| reason_of(&a.reason));

        let mut reasons: Vec<(&String, u64)> =
            week_by_reason.iter().map(|(r, c)| (r, *c)).collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        let mut out = StageOutput::new();
        out.field("accident_total", week.len() as u64)
            .field("accident_ytd", ytd.len() as u64)
            .field(
                "accident_avg_days_after_mating",
                round1(average(after_mating)),
            );

        out.detail(ReportDetail::new(
            NAME,
            "summary",
            1,
            json!({ "week": week.len(), "ytd": ytd.len() }),
        ));
        for (idx, (reason, count)) in reasons.iter().enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                "reason",
                idx as u32 + 1,
                json!({
                    "reason": reason,
                    "week": count,
                    "ytd": ytd_by_reason.get(*reason).copied().unwrap_or(0),
                }),
            ));
        }

        Ok(out)
    }
}
