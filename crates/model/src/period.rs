use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Period start {from} is after period end {to}")]
    Inverted { from: NaiveDate, to: NaiveDate },

    #[error("Unknown period kind: {0}")]
    UnknownKind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    Week,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Week => "WEEK",
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodKind {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEEK" => Ok(PeriodKind::Week),
            other => Err(PeriodError::UnknownKind(other.to_string())),
        }
    }
}

/// Inclusive reporting window together with its ISO week label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub kind: PeriodKind,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub year: i32,
    pub week_no: u32,
}

impl ReportPeriod {
    /// Monday..Sunday of the week before `reference`, labelled with the
    /// ISO week of `reference` (the week in which the report is produced).
    pub fn previous_week(reference: NaiveDate) -> Self {
        let days_from_monday = i64::from(reference.weekday().num_days_from_monday());
        let last_sunday = reference - Duration::days(days_from_monday + 1);
        let last_monday = last_sunday - Duration::days(6);
        let iso = reference.iso_week();

        ReportPeriod {
            kind: PeriodKind::Week,
            from: last_monday,
            to: last_sunday,
            year: iso.year(),
            week_no: iso.week(),
        }
    }

    /// Monday of the reference week through the reference date itself.
    pub fn current_week(reference: NaiveDate) -> Self {
        let days_from_monday = i64::from(reference.weekday().num_days_from_monday());
        let monday = reference - Duration::days(days_from_monday);
        let iso = reference.iso_week();

        ReportPeriod {
            kind: PeriodKind::Week,
            from: monday,
            to: reference,
            year: iso.year(),
            week_no: iso.week(),
        }
    }

    pub fn from_bounds(from: NaiveDate, to: NaiveDate) -> Result<Self, PeriodError> {
        if from > to {
            return Err(PeriodError::Inverted { from, to });
        }
        let iso = from.iso_week();
        Ok(ReportPeriod {
            kind: PeriodKind::Week,
            from,
            to,
            year: iso.year(),
            week_no: iso.week(),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// January 1st of the year the period ends in; start of year-to-date figures.
    pub fn year_start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.to.year(), 1, 1).unwrap_or(self.from)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from.iter_days().take_while(move |d| *d <= self.to)
    }

    /// The seven days following the period end.
    pub fn next_week(&self) -> ReportPeriod {
        let from = self.to + Duration::days(1);
        let to = from + Duration::days(6);
        let iso = from.iso_week();
        ReportPeriod {
            kind: self.kind,
            from,
            to,
            year: iso.year(),
            week_no: iso.week(),
        }
    }

    /// Stable identity of the period used to key per-farm reports.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind,
            self.from.format("%Y%m%d"),
            self.to.format("%Y%m%d")
        )
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-W{:02} ({} ~ {})",
            self.kind, self.year, self.week_no, self.from, self.to
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn previous_week_spans_monday_to_sunday() {
        // 2025-06-18 is a Wednesday.
        let period = ReportPeriod::previous_week(date(2025, 6, 18));
        assert_eq!(period.from, date(2025, 6, 9));
        assert_eq!(period.to, date(2025, 6, 15));
        assert_eq!(period.week_no, 25);
        assert_eq!(period.year, 2025);
    }

    #[test]
    fn previous_week_from_a_monday() {
        let period = ReportPeriod::previous_week(date(2025, 6, 16));
        assert_eq!(period.from, date(2025, 6, 9));
        assert_eq!(period.to, date(2025, 6, 15));
    }

    #[test]
    fn current_week_ends_on_reference() {
        let period = ReportPeriod::current_week(date(2025, 6, 18));
        assert_eq!(period.from, date(2025, 6, 16));
        assert_eq!(period.to, date(2025, 6, 18));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = ReportPeriod::from_bounds(date(2025, 6, 15), date(2025, 6, 9)).unwrap_err();
        assert!(matches!(err, PeriodError::Inverted { .. }));
    }

    #[test]
    fn key_and_days() {
        let period = ReportPeriod::from_bounds(date(2025, 6, 9), date(2025, 6, 15)).unwrap();
        assert_eq!(period.key(), "WEEK:20250609:20250615");
        assert_eq!(period.days().count(), 7);
        assert_eq!(period.next_week().from, date(2025, 6, 16));
        assert_eq!(period.year_start(), date(2025, 1, 1));
    }
}
