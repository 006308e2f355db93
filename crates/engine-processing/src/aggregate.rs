//! Stateless helpers shared by the stages: filtering by kind and window,
//! grouping, pivoting and NaN-free averaging.

use chrono::NaiveDate;
use model::{
    period::ReportPeriod,
    snapshot::{EventKind, SowRecord, WorkEvent},
};
use std::collections::BTreeMap;

/// One reference auction row used for the national carcass price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePrice {
    pub head_count: i64,
    pub price_per_kg: f64,
}

pub fn events_between(
    events: &[WorkEvent],
    kind: EventKind,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<&WorkEvent> {
    events
        .iter()
        .filter(|e| e.kind == kind && from <= e.date && e.date <= to)
        .collect()
}

pub fn events_in<'a>(
    events: &'a [WorkEvent],
    kind: EventKind,
    period: &ReportPeriod,
) -> Vec<&'a WorkEvent> {
    events_between(events, kind, period.from, period.to)
}

/// Events of `kind` from January 1st through the period end.
pub fn events_year_to_date<'a>(
    events: &'a [WorkEvent],
    kind: EventKind,
    period: &ReportPeriod,
) -> Vec<&'a WorkEvent> {
    events_between(events, kind, period.year_start(), period.to)
}

/// The latest event of `kind` for `pig_no` strictly before `before`.
pub fn last_before<'a>(
    events: &'a [WorkEvent],
    pig_no: &str,
    kind: EventKind,
    before: NaiveDate,
) -> Option<&'a WorkEvent> {
    events
        .iter()
        .filter(|e| e.pig_no == pig_no && e.kind == kind && e.date < before)
        .max_by_key(|e| e.date)
}

/// Sows still in the herd on `date`.
pub fn herd_on(sows: &[SowRecord], date: NaiveDate) -> impl Iterator<Item = &SowRecord> {
    sows.iter()
        .filter(move |s| s.out_on.is_none_or(|out| out > date))
}

pub fn group_count<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> BTreeMap<K, u64>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups = BTreeMap::new();
    for item in items {
        *groups.entry(key(&item)).or_insert(0) += 1;
    }
    groups
}

/// Two-level count table, rows by `row`, columns by `col`.
pub fn pivot_count<T, R, C, FR, FC>(
    items: impl IntoIterator<Item = T>,
    row: FR,
    col: FC,
) -> BTreeMap<R, BTreeMap<C, u64>>
where
    R: Ord,
    C: Ord,
    FR: Fn(&T) -> R,
    FC: Fn(&T) -> C,
{
    let mut table: BTreeMap<R, BTreeMap<C, u64>> = BTreeMap::new();
    for item in items {
        *table
            .entry(row(&item))
            .or_default()
            .entry(col(&item))
            .or_insert(0) += 1;
    }
    table
}

/// Arithmetic mean; 0.0 for an empty input.
pub fn average(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0u64), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

pub fn round1(value: f64) -> f64 {
    if value.is_finite() {
        (value * 10.0).round() / 10.0
    } else {
        0.0
    }
}

/// `part / whole` in percent, one decimal; 0.0 when `whole` is zero.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 * 100.0 / whole as f64)
    }
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Head-count weighted average price, rounded to the won; 0 when no heads.
pub fn national_price(rows: &[ReferencePrice]) -> i64 {
    let (weighted, heads) = rows
        .iter()
        .filter(|r| r.head_count > 0 && r.price_per_kg.is_finite())
        .fold((0.0, 0i64), |(w, h), r| {
            (w + r.head_count as f64 * r.price_per_kg, h + r.head_count)
        });
    if heads == 0 {
        0
    } else {
        (weighted / heads as f64).round() as i64
    }
}
