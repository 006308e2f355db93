use super::{Stage, StageContext, StageOutput};
use crate::{
    aggregate::{events_in, events_year_to_date, round1},
    error::StageError,
};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, EventKind, WorkEvent},
};
use serde_json::json;
use std::collections::BTreeMap;

pub const NAME: &str = "farrowing";

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct LitterTotals {
    litters: u64,
    total: u64,
    live: u64,
    dead: u64,
    mummy: u64,
}

impl LitterTotals {
    fn of<'a>(litters: impl IntoIterator<Item = &'a WorkEvent>) -> Self {
        litters.into_iter().fold(LitterTotals::default(), |mut t, e| {
            t.litters += 1;
            t.total += u64::from(e.total_born());
            t.live += u64::from(e.live);
            t.dead += u64::from(e.dead);
            t.mummy += u64::from(e.mummy);
            t
        })
    }

    fn per_litter(&self, sum: u64) -> f64 {
        if self.litters == 0 {
            0.0
        } else {
            round1(sum as f64 / self.litters as f64)
        }
    }
}

pub struct FarrowingStage;

impl Stage for FarrowingStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let week = events_in(&snapshot.events, EventKind::Farrowing, &snapshot.period);
        let ytd = events_year_to_date(&snapshot.events, EventKind::Farrowing, &snapshot.period);

        let totals = LitterTotals::of(week.iter().copied());
        let ytd_totals = LitterTotals::of(ytd.iter().copied());

        let mut out = StageOutput::new();
        out.field("farrowing_litters", totals.litters)
            .field("farrowing_total_born", totals.total)
            .field("farrowing_live", totals.live)
            .field("farrowing_dead", totals.dead)
            .field("farrowing_mummy", totals.mummy)
            .field("farrowing_avg_total", totals.per_litter(totals.total))
            .field("farrowing_avg_live", totals.per_litter(totals.live))
            .field("farrowing_ytd_litters", ytd_totals.litters)
            .field("farrowing_ytd_avg_total", ytd_totals.per_litter(ytd_totals.total))
            .field("farrowing_ytd_avg_live", ytd_totals.per_litter(ytd_totals.live));

        out.detail(ReportDetail::new(
            NAME,
            "summary",
            1,
            json!({
                "litters": totals.litters,
                "avg_total": totals.per_litter(totals.total),
                "avg_live": totals.per_litter(totals.live),
                "avg_dead": totals.per_litter(totals.dead),
                "avg_mummy": totals.per_litter(totals.mummy),
            }),
        ));

        let mut by_parity: BTreeMap<u32, Vec<&WorkEvent>> = BTreeMap::new();
        for litter in week.iter().copied() {
            by_parity.entry(litter.parity).or_default().push(litter);
        }
        for (idx, (parity, litters)) in by_parity.iter().enumerate() {
            let t = LitterTotals::of(litters.iter().copied());
            out.detail(ReportDetail::new(
                NAME,
                "parity",
                idx as u32 + 1,
                json!({
                    "parity": parity,
                    "litters": t.litters,
                    "avg_live": t.per_litter(t.live),
                    "avg_total": t.per_litter(t.total),
                }),
            ));
        }

        Ok(out)
    }
}
