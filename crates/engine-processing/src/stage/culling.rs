use super::{Stage, StageContext, StageOutput};
use crate::{aggregate::group_count, error::StageError};
use chrono::NaiveDate;
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, OutKind, SowRecord},
};
use serde_json::json;

pub const NAME: &str = "culling";

const OTHER_REASON: &str = "other";

fn left_between(sows: &[SowRecord], from: NaiveDate, to: NaiveDate) -> Vec<&SowRecord> {
    sows.iter()
        .filter(|s| s.out_on.is_some_and(|d| from <= d && d <= to))
        .collect()
}

fn reason_of(sow: &SowRecord) -> String {
    sow.out_reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(OTHER_REASON)
        .to_string()
}

/// Sows that left the herd, by kind and by reason.
pub struct CullingStage;

impl Stage for CullingStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let period = &snapshot.period;
        let week = left_between(&snapshot.sows, period.from, period.to);
        let ytd = left_between(
            &snapshot.sows,
            period.year_start().min(period.from),
            period.to,
        );

        let week_by_kind = group_count(week.iter(), |s| s.out_kind);
        let ytd_by_kind = group_count(ytd.iter(), |s| s.out_kind);

        let mut out = StageOutput::new();
        for (idx, kind) in OutKind::ORDER.iter().enumerate() {
            let week_count = week_by_kind.get(&Some(*kind)).copied().unwrap_or(0);
            let ytd_count = ytd_by_kind.get(&Some(*kind)).copied().unwrap_or(0);
            out.field(&format!("culling_{}", kind.as_str()), week_count);
            out.detail(ReportDetail::new(
                NAME,
                "kind",
                idx as u32 + 1,
                json!({ "kind": kind.as_str(), "week": week_count, "ytd": ytd_count }),
            ));
        }
        out.field("culling_total", week.len() as u64)
            .field("culling_ytd_total", ytd.len() as u64);

        let week_by_reason = group_count(week.iter(), |s| reason_of(s));
        let mut reasons: Vec<(String, u64)> = group_count(ytd.iter(), |s| reason_of(s))
            .into_iter()
            .collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        for (idx, (reason, ytd_count)) in reasons.iter().enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                "reason",
                idx as u32 + 1,
                json!({
                    "reason": reason,
                    "week": week_by_reason.get(reason).copied().unwrap_or(0),
                    "ytd": ytd_count,
                }),
            ));
        }

        Ok(out)
    }
}
