use super::{Stage, StageContext, StageOutput};
use crate::error::StageError;
use model::{records::report::ReportDetail, snapshot::EntitySnapshot};
use serde_json::json;

pub const NAME: &str = "configuration";

pub const FIELD_GESTATION: &str = "cfg_gestation_days";
pub const FIELD_LACTATION: &str = "cfg_lactation_days";
pub const FIELD_REMATING: &str = "cfg_remating_days";
pub const FIELD_SHIPMENT_AGE: &str = "cfg_shipment_age_days";

pub const DEFAULT_GESTATION: i64 = 115;
pub const DEFAULT_LACTATION: i64 = 21;
pub const DEFAULT_REMATING: i64 = 7;
pub const DEFAULT_SHIPMENT_AGE: i64 = 180;

/// (config code, report field, default)
const PARAMETERS: [(&str, &str, i64); 4] = [
    ("gestation_days", FIELD_GESTATION, DEFAULT_GESTATION),
    ("lactation_days", FIELD_LACTATION, DEFAULT_LACTATION),
    ("remating_days", FIELD_REMATING, DEFAULT_REMATING),
    ("shipment_age_days", FIELD_SHIPMENT_AGE, DEFAULT_SHIPMENT_AGE),
];

/// Effective farm parameters. Later stages read the `cfg_*` fields.
pub struct ConfigurationStage;

impl Stage for ConfigurationStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        _ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let mut out = StageOutput::new();

        for (sort_no, (code, field, default)) in PARAMETERS.iter().enumerate() {
            let (value, origin) = match snapshot.config_value(code).map(str::trim) {
                None | Some("") => (*default, "default"),
                Some(raw) => match raw.parse::<i64>() {
                    Ok(days) if days > 0 => (days, "farm"),
                    _ => {
                        return Err(StageError::new(
                            NAME,
                            format!("invalid value '{raw}' for {code}"),
                        ));
                    }
                },
            };

            out.field(field, value);
            out.detail(ReportDetail::new(
                NAME,
                "parameter",
                sort_no as u32 + 1,
                json!({ "code": code, "days": value, "origin": origin }),
            ));
        }

        Ok(out)
    }
}
