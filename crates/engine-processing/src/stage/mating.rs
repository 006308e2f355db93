use super::{Stage, StageContext, StageOutput};
use crate::{
    aggregate::{average, days_between, events_in, events_year_to_date, last_before, round1},
    error::StageError,
};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, EventKind, WorkEvent},
};
use serde_json::json;

pub const NAME: &str = "mating";

/// Upper bounds (inclusive) of the wean-to-mate buckets; anything above the
/// last bound lands in the open bucket.
const BUCKET_BOUNDS: [i64; 10] = [7, 10, 15, 20, 25, 30, 35, 40, 45, 50];

fn bucket_label(idx: usize) -> String {
    match idx {
        0 => "~7".to_string(),
        i if i < BUCKET_BOUNDS.len() => BUCKET_BOUNDS[i].to_string(),
        _ => "50↑".to_string(),
    }
}

fn bucket_of(days: i64) -> usize {
    BUCKET_BOUNDS
        .iter()
        .position(|bound| days <= *bound)
        .unwrap_or(BUCKET_BOUNDS.len())
}

/// A mating is a re-mating when the same sow was already mated in the same parity.
fn is_remating(events: &[WorkEvent], mating: &WorkEvent) -> bool {
    events.iter().any(|e| {
        e.kind == EventKind::Mating
            && e.pig_no == mating.pig_no
            && e.parity == mating.parity
            && e.date < mating.date
    })
}

pub struct MatingStage;

impl Stage for MatingStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let period = &snapshot.period;
        let matings = events_in(&snapshot.events, EventKind::Mating, period);

        let (rematings, first): (Vec<&WorkEvent>, Vec<&WorkEvent>) = matings
            .iter()
            .copied()
            .partition(|m| is_remating(&snapshot.events, m));
        let gilts = first.iter().filter(|m| m.parity == 0).count() as u64;

        // Days from the preceding weaning, first matings of sows only.
        let wean_to_mate: Vec<i64> = first
            .iter()
            .filter(|m| m.parity > 0)
            .filter_map(|m| {
                last_before(&snapshot.events, &m.pig_no, EventKind::Weaning, m.date)
                    .map(|w| days_between(w.date, m.date))
            })
            .collect();

        let mut buckets = [0u64; BUCKET_BOUNDS.len() + 1];
        for days in &wean_to_mate {
            buckets[bucket_of(*days)] += 1;
        }

        let ytd = events_year_to_date(&snapshot.events, EventKind::Mating, period).len() as u64;

        let mut out = StageOutput::new();
        out.field("mating_total", matings.len() as u64)
            .field("mating_first", first.len() as u64)
            .field("mating_gilt", gilts)
            .field("mating_remating", rematings.len() as u64)
            .field(
                "mating_avg_wean_to_mate",
                round1(average(wean_to_mate.iter().map(|d| *d as f64))),
            )
            .field("mating_ytd", ytd);

        for (idx, count) in buckets.iter().enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                "chart",
                idx as u32 + 1,
                json!({ "bucket": bucket_label(idx), "count": count }),
            ));
        }

        Ok(out)
    }
}
