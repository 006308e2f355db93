use super::{Stage, StageContext, StageOutput};
use crate::{
    aggregate::{average, group_count, herd_on, round1},
    error::StageError,
};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, SowState},
};
use serde_json::json;

pub const NAME: &str = "status_summary";

const STATES: [SowState; 5] = [
    SowState::Candidate,
    SowState::Gestating,
    SowState::Lactating,
    SowState::Weaned,
    SowState::Open,
];

/// Herd composition at the period end.
pub struct StatusSummaryStage;

impl Stage for StatusSummaryStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let herd: Vec<_> = herd_on(&snapshot.sows, snapshot.period.to)
            .filter(|s| s.state != SowState::Culled)
            .collect();
        let by_state = group_count(herd.iter(), |s| s.state);
        let breeding: Vec<f64> = herd
            .iter()
            .filter(|s| s.state != SowState::Candidate)
            .map(|s| f64::from(s.parity))
            .collect();

        let mut out = StageOutput::new();
        for (idx, state) in STATES.iter().enumerate() {
            let count = by_state.get(state).copied().unwrap_or(0);
            out.field(&format!("herd_{}", state.as_str()), count);
            out.detail(ReportDetail::new(
                NAME,
                "state",
                idx as u32 + 1,
                json!({ "state": state.as_str(), "count": count }),
            ));
        }
        out.field("herd_total", herd.len() as u64)
            .field("herd_avg_parity", round1(average(breeding)));

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, run_stage, snapshot, sow};
    use model::core::value::Value;

    #[test]
    fn counts_sows_present_at_period_end() {
        let mut snap = snapshot();
        let mut sold = sow("S9", SowState::Weaned, date(5, 1), 5);
        sold.out_on = Some(date(6, 10));
        snap.sows = vec![
            sow("C1", SowState::Candidate, date(3, 1), 0),
            sow("G1", SowState::Gestating, date(4, 1), 2),
            sow("G2", SowState::Gestating, date(4, 2), 3),
            sow("L1", SowState::Lactating, date(6, 1), 4),
            sold,
        ];

        let out = run_stage(&StatusSummaryStage, &snap).unwrap();
        assert_eq!(out.fields["herd_candidate"], Value::Int(1));
        assert_eq!(out.fields["herd_gestating"], Value::Int(2));
        assert_eq!(out.fields["herd_weaned"], Value::Int(0));
        assert_eq!(out.fields["herd_total"], Value::Int(4));
        assert_eq!(out.fields["herd_avg_parity"], Value::Float(3.0));
        assert_eq!(out.details.len(), 5);
    }
}
