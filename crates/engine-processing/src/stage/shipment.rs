use super::{Stage, StageContext, StageOutput};
use crate::{
    aggregate::{average, percent, pivot_count, round1},
    error::StageError,
};
use chrono::NaiveDate;
use model::{
    records::report::ReportDetail,
    snapshot::{EntitySnapshot, ShipmentRecord},
};
use serde_json::json;
use std::collections::BTreeMap;

pub const NAME: &str = "shipment";

const GRADE_1_UP: &str = "1_up";
const GRADE_2: &str = "2";
const OFF_GRADE: &str = "off";

/// (lower bound inclusive, upper bound exclusive, label)
const KG_RANGES: [(Option<f64>, Option<f64>, &str); 5] = [
    (None, Some(90.0), "~90"),
    (Some(90.0), Some(100.0), "90~100"),
    (Some(100.0), Some(110.0), "100~110"),
    (Some(110.0), Some(120.0), "110~120"),
    (Some(120.0), None, "120↑"),
];

fn grade_label(grade: Option<&str>) -> &'static str {
    match grade.map(str::trim) {
        Some("1+") | Some("1") => GRADE_1_UP,
        Some("2") => GRADE_2,
        _ => OFF_GRADE,
    }
}

fn kg_label(kg: f64) -> &'static str {
    KG_RANGES
        .iter()
        .find(|(low, high, _)| low.is_none_or(|l| kg >= l) && high.is_none_or(|h| kg < h))
        .map(|(_, _, label)| *label)
        .unwrap_or(OFF_GRADE)
}

fn average_kg<'a>(records: impl IntoIterator<Item = &'a ShipmentRecord>) -> f64 {
    round1(average(records.into_iter().map(|r| r.carcass_kg)))
}

/// Carcass results of the week against the national reference price.
pub struct ShipmentStage;

impl Stage for ShipmentStage {
    fn name(&self) -> &str {
        NAME
    }

    fn run(
        &self,
        snapshot: &EntitySnapshot,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let period = &snapshot.period;
        let week: Vec<&ShipmentRecord> = snapshot
            .shipments
            .iter()
            .filter(|r| period.contains(r.date))
            .collect();
        let ytd: Vec<&ShipmentRecord> = snapshot
            .shipments
            .iter()
            .filter(|r| period.year_start() <= r.date && r.date <= period.to)
            .collect();

        let head_count = week.len() as u64;
        let grade_1_up = week
            .iter()
            .filter(|r| grade_label(r.grade.as_deref()) == GRADE_1_UP)
            .count() as u64;
        let avg_backfat = round1(average(week.iter().filter_map(|r| r.backfat_mm)));
        let avg_price = average(week.iter().filter_map(|r| r.price_per_kg)).round() as i64;

        let national_price = ctx.entity.shared.national_price;
        let price_diff = if avg_price > 0 && national_price > 0 {
            avg_price - national_price
        } else {
            0
        };

        let mut out = StageOutput::new();
        out.field("ship_count", head_count)
            .field("ship_avg_kg", average_kg(week.iter().copied()))
            .field("ship_avg_backfat", avg_backfat)
            .field("ship_grade_1_ratio", percent(grade_1_up, head_count))
            .field("ship_avg_price", avg_price)
            .field("ship_national_price", national_price)
            .field("ship_price_diff", price_diff)
            .field("ship_ytd_count", ytd.len() as u64)
            .field("ship_ytd_avg_kg", average_kg(ytd.iter().copied()));

        out.detail(ReportDetail::new(
            NAME,
            "stat",
            1,
            json!({
                "count": head_count,
                "avg_kg": average_kg(week.iter().copied()),
                "avg_price": avg_price,
                "national_price": national_price,
            }),
        ));

        let mut by_day: BTreeMap<NaiveDate, Vec<&ShipmentRecord>> = BTreeMap::new();
        for record in week.iter().copied() {
            by_day.entry(record.date).or_default().push(record);
        }
        for (idx, (day, records)) in by_day.iter().enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                "chart",
                idx as u32 + 1,
                json!({
                    "date": day,
                    "count": records.len(),
                    "avg_kg": average_kg(records.iter().copied()),
                }),
            ));
        }

        let scatter = pivot_count(
            week.iter().copied(),
            |r| grade_label(r.grade.as_deref()),
            |r| kg_label(r.carcass_kg),
        );
        let cells = scatter
            .iter()
            .flat_map(|(grade, row)| row.iter().map(move |(kg, count)| (*grade, *kg, *count)));
        for (idx, (grade, kg, count)) in cells.enumerate() {
            out.detail(ReportDetail::new(
                NAME,
                "scatter",
                idx as u32 + 1,
                json!({ "grade": grade, "kg_range": kg, "count": count }),
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, run_stage, run_stage_with, shipment, snapshot};
    use model::{core::value::Value, records::report::ReportFields};

    #[test]
    fn labels() {
        assert_eq!(grade_label(Some("1+")), GRADE_1_UP);
        assert_eq!(grade_label(Some(" 1")), GRADE_1_UP);
        assert_eq!(grade_label(Some("2")), GRADE_2);
        assert_eq!(grade_label(None), OFF_GRADE);
        assert_eq!(kg_label(89.9), "~90");
        assert_eq!(kg_label(90.0), "90~100");
        assert_eq!(kg_label(120.0), "120↑");
    }

    #[test]
    fn week_stats_against_national_price() {
        let mut snap = snapshot();
        let mut priced = shipment(date(6, 10), 115.0, "1+");
        priced.price_per_kg = Some(5200.0);
        priced.backfat_mm = Some(20.0);
        snap.shipments = vec![
            priced,
            shipment(date(6, 10), 118.0, "1"),
            shipment(date(6, 12), 95.0, "2"),
            shipment(date(6, 13), 125.0, "E"),
            shipment(date(3, 1), 110.0, "1"),
        ];

        let out = run_stage_with(&ShipmentStage, &snap, &ReportFields::new(), 5000).unwrap();
        assert_eq!(out.fields["ship_count"], Value::Int(4));
        assert_eq!(out.fields["ship_avg_kg"], Value::Float(113.3));
        assert_eq!(out.fields["ship_avg_backfat"], Value::Float(20.0));
        assert_eq!(out.fields["ship_grade_1_ratio"], Value::Float(50.0));
        assert_eq!(out.fields["ship_avg_price"], Value::Int(5200));
        assert_eq!(out.fields["ship_price_diff"], Value::Int(200));
        assert_eq!(out.fields["ship_ytd_count"], Value::Int(5));

        let chart: Vec<_> = out.details.iter().filter(|d| d.kind == "chart").collect();
        assert_eq!(chart.len(), 3);
        assert_eq!(chart[0].payload["date"], "2025-06-10");
        assert_eq!(chart[0].payload["count"], 2);

        let scatter = out.details.iter().filter(|d| d.kind == "scatter").count();
        assert_eq!(scatter, 3);
    }

    #[test]
    fn no_national_price_means_no_difference() {
        let mut snap = snapshot();
        let mut priced = shipment(date(6, 10), 115.0, "1");
        priced.price_per_kg = Some(5200.0);
        snap.shipments = vec![priced];

        let out = run_stage(&ShipmentStage, &snap).unwrap();
        assert_eq!(out.fields["ship_price_diff"], Value::Int(0));
    }
}
