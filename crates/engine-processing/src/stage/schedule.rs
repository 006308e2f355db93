use super::{
    Stage, StageContext, StageOutput,
    configuration::{FIELD_GESTATION, FIELD_LACTATION, FIELD_REMATING},
};
use crate::{aggregate::herd_on, error::StageError};
use chrono::{Duration, NaiveDate};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, SowState},
};
use serde_json::json;
use std::collections::BTreeMap;

pub const NAME: &str = "schedule";

/// Pregnancy checks happen three and four weeks after mating.
const PREGNANCY_CHECK_DAYS: [i64; 2] = [21, 28];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DayPlan {
    mating: u64,
    farrowing: u64,
    weaning: u64,
    pregnancy_check: u64,
}

/// Work expected in the week after the period, from sow state and the
/// intervals resolved by the configuration stage.
pub struct ScheduleStage;

impl Stage for ScheduleStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let remating = ctx.require_i64(NAME, FIELD_REMATING)?;
        let gestation = ctx.require_i64(NAME, FIELD_GESTATION)?;
        let lactation = ctx.require_i64(NAME, FIELD_LACTATION)?;

        let next = snapshot.period.next_week();
        let mut calendar: BTreeMap<NaiveDate, DayPlan> =
            next.days().map(|d| (d, DayPlan::default())).collect();

        for sow in herd_on(&snapshot.sows, snapshot.period.to) {
            let Some(since) = sow.state_since else {
                continue;
            };
            match sow.state {
                SowState::Weaned | SowState::Open => {
                    if let Some(day) = calendar.get_mut(&(since + Duration::days(remating))) {
                        day.mating += 1;
                    }
                }
                SowState::Gestating => {
                    if let Some(day) = calendar.get_mut(&(since + Duration::days(gestation))) {
                        day.farrowing += 1;
                    }
                    for offset in PREGNANCY_CHECK_DAYS {
                        if let Some(day) = calendar.get_mut(&(since + Duration::days(offset))) {
                            day.pregnancy_check += 1;
                        }
                    }
                }
                SowState::Lactating => {
                    if let Some(day) = calendar.get_mut(&(since + Duration::days(lactation))) {
                        day.weaning += 1;
                    }
                }
                SowState::Candidate | SowState::Culled => {}
            }
        }

        let total = calendar.values().fold(DayPlan::default(), |mut t, d| {
            t.mating += d.mating;
            t.farrowing += d.farrowing;
            t.weaning += d.weaning;
            t.pregnancy_check += d.pregnancy_check;
            t
        });

        let mut out = StageOutput::new();
        out.field("sched_from", next.from)
            .field("sched_to", next.to)
            .field("sched_mating", total.mating)
            .field("sched_farrowing", total.farrowing)
            .field("sched_weaning", total.weaning)
            .field("sched_pregnancy_check", total.pregnancy_check);

        for (idx, (day, plan)) in calendar.iter().enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                "calendar",
                idx as u32 + 1,
                json!({
                    "date": day,
                    "mating": plan.mating,
                    "farrowing": plan.farrowing,
                    "weaning": plan.weaning,
                    "pregnancy_check": plan.pregnancy_check,
                }),
            ));
        }

        Ok(out)
    }
}
