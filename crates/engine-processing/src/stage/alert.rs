use super::{
    Stage, StageContext, StageOutput,
    configuration::{
        DEFAULT_GESTATION, DEFAULT_LACTATION, DEFAULT_REMATING, FIELD_GESTATION, FIELD_LACTATION,
        FIELD_REMATING,
    },
};
use crate::{
    aggregate::{days_between, herd_on},
    error::StageError,
};
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, SowState},
};
use serde_json::json;

pub const NAME: &str = "alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AlertKind {
    Unmated,
    FarrowingOverdue,
    WeaningOverdue,
}

impl AlertKind {
    fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Unmated => "unmated",
            AlertKind::FarrowingOverdue => "farrowing_overdue",
            AlertKind::WeaningOverdue => "weaning_overdue",
        }
    }
}

/// Sows overdue for their next event as of the period end.
pub struct AlertStage;

impl Stage for AlertStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let as_of = snapshot.period.to;
        let remating = ctx.field_i64(FIELD_REMATING, DEFAULT_REMATING);
        let gestation = ctx.field_i64(FIELD_GESTATION, DEFAULT_GESTATION);
        let lactation = ctx.field_i64(FIELD_LACTATION, DEFAULT_LACTATION);

        let mut alerts = Vec::new();
        for sow in herd_on(&snapshot.sows, as_of) {
            let Some(since) = sow.state_since else {
                continue;
            };
            let days = days_between(since, as_of);
            let kind = match sow.state {
                SowState::Weaned | SowState::Open if days > remating => AlertKind::Unmated,
                SowState::Gestating if days > gestation => AlertKind::FarrowingOverdue,
                SowState::Lactating if days > lactation => AlertKind::WeaningOverdue,
                _ => continue,
            };
            alerts.push((kind, days, sow));
        }
        alerts.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.pig_no.cmp(&b.2.pig_no)));

        let count = |kind: AlertKind| alerts.iter().filter(|a| a.0 == kind).count() as u64;
        let unmated = count(AlertKind::Unmated);
        let farrowing = count(AlertKind::FarrowingOverdue);
        let weaning = count(AlertKind::WeaningOverdue);

        let mut out = StageOutput::new();
        out.field("alert_unmated", unmated)
            .field("alert_farrowing_overdue", farrowing)
            .field("alert_weaning_overdue", weaning)
            .field("alert_total", alerts.len() as u64);

        out.detail(ReportDetail::new(
            NAME,
            "summary",
            1,
            json!({
                "as_of": as_of,
                "unmated": unmated,
                "farrowing_overdue": farrowing,
                "weaning_overdue": weaning,
            }),
        ));
        for (idx, (kind, days, sow)) in alerts.iter().enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                kind.as_str(),
                idx as u32 + 1,
                json!({
                    "pig_no": sow.pig_no,
                    "parity": sow.parity,
                    "state": sow.state.as_str(),
                    "days": days,
                }),
            ));
        }

        Ok(out)
    }
}
