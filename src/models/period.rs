//! Calendar periods used by the statistics views
//!
//! Periods are local wall-clock calendar units. Their bounds are half-open
//! `[start, end)` ranges over `NaiveDateTime`, which matches how expense
//! dates are stored.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Earliest year a period may refer to.
pub const MIN_YEAR: i32 = 1;
/// Latest year a period may refer to (its successor must still be representable).
pub const MAX_YEAR: i32 = 9998;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Which statistics view a period belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Month,
    Year,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Month => write!(f, "month"),
            ViewMode::Year => write!(f, "year"),
        }
    }
}

/// A half-open local time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at < self.end
    }
}

/// A calendar month or year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum Period {
    Month { year: i32, month: u32 },
    Year { year: i32 },
}

impl Period {
    /// Build a month period; `None` if the month or year is out of range.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (MIN_YEAR..=MAX_YEAR).contains(&year) {
            Some(Self::Month { year, month })
        } else {
            None
        }
    }

    /// Build a year period; `None` if the year is out of range.
    pub fn year(year: i32) -> Option<Self> {
        (MIN_YEAR..=MAX_YEAR)
            .contains(&year)
            .then_some(Self::Year { year })
    }

    /// The month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The year containing `date`.
    pub fn year_of(date: NaiveDate) -> Self {
        Self::Year { year: date.year() }
    }

    pub fn mode(&self) -> ViewMode {
        match self {
            Period::Month { .. } => ViewMode::Month,
            Period::Year { .. } => ViewMode::Year,
        }
    }

    pub fn year_number(&self) -> i32 {
        match *self {
            Period::Month { year, .. } | Period::Year { year } => year,
        }
    }

    pub fn month_number(&self) -> Option<u32> {
        match *self {
            Period::Month { month, .. } => Some(month),
            Period::Year { .. } => None,
        }
    }

    /// First day of the period.
    pub fn first_day(&self) -> NaiveDate {
        match *self {
            Period::Month { year, month } => first_of_month(year, month),
            Period::Year { year } => first_of_month(year, 1),
        }
    }

    /// `[start, end)` bounds in local wall-clock time.
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.first_day().and_time(chrono::NaiveTime::MIN),
            end: self.next().first_day().and_time(chrono::NaiveTime::MIN),
        }
    }

    /// The period immediately before this one. Months wrap across years.
    pub fn previous(&self) -> Self {
        match *self {
            Period::Month { year, month: 1 } => Period::Month {
                year: year - 1,
                month: 12,
            },
            Period::Month { year, month } => Period::Month {
                year,
                month: month - 1,
            },
            Period::Year { year } => Period::Year { year: year - 1 },
        }
    }

    /// The period immediately after this one. Months wrap across years.
    pub fn next(&self) -> Self {
        match *self {
            Period::Month { year, month: 12 } => Period::Month {
                year: year + 1,
                month: 1,
            },
            Period::Month { year, month } => Period::Month {
                year,
                month: month + 1,
            },
            Period::Year { year } => Period::Year { year: year + 1 },
        }
    }

    /// Whether `date` falls inside this period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            Period::Month { year, month } => date.year() == year && date.month() == month,
            Period::Year { year } => date.year() == year,
        }
    }

    /// Number of chart buckets: days in the month, or 12 for a year.
    pub fn bucket_count(&self) -> u32 {
        match *self {
            Period::Month { year, month } => days_in_month(year, month),
            Period::Year { .. } => 12,
        }
    }

    /// e.g. `March 2024` or `2024`.
    pub fn label(&self) -> String {
        match *self {
            Period::Month { year, month } => {
                format!("{} {}", MONTH_NAMES[(month - 1) as usize], year)
            }
            Period::Year { year } => year.to_string(),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // Constructors keep year/month in range, so this never falls back in practice.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// Whether `year` is a Gregorian leap year.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Days in the given month of the proleptic Gregorian calendar.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Three-letter English month abbreviation (`Jan`..`Dec`).
pub fn month_abbreviation(month: u32) -> &'static str {
    MONTH_ABBREVIATIONS
        .get((month as usize).wrapping_sub(1))
        .copied()
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_in_february() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
    }

    #[test]
    fn test_month_navigation_wraps_years() {
        let jan = Period::month(2024, 1).unwrap();
        assert_eq!(jan.previous(), Period::Month { year: 2023, month: 12 });

        let dec = Period::month(2023, 12).unwrap();
        assert_eq!(dec.next(), Period::Month { year: 2024, month: 1 });
    }

    #[test]
    fn test_month_range_is_half_open() {
        let range = Period::month(2024, 2).unwrap().range();
        assert_eq!(range.start, date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(range.end, date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap());

        assert!(range.contains(date(2024, 2, 29).and_hms_opt(23, 59, 59).unwrap()));
        assert!(!range.contains(date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap()));
        assert!(!range.contains(date(2024, 1, 31).and_hms_opt(23, 59, 59).unwrap()));
    }

    #[test]
    fn test_year_range() {
        let range = Period::year(2023).unwrap().range();
        assert_eq!(range.start.date(), date(2023, 1, 1));
        assert_eq!(range.end.date(), date(2024, 1, 1));
    }

    #[test]
    fn test_constructors_reject_out_of_range() {
        assert!(Period::month(2024, 0).is_none());
        assert!(Period::month(2024, 13).is_none());
        assert!(Period::year(0).is_none());
        assert!(Period::year(MAX_YEAR + 1).is_none());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Period::month(2024, 3).unwrap().label(), "March 2024");
        assert_eq!(Period::year(2024).unwrap().label(), "2024");
        assert_eq!(month_abbreviation(1), "Jan");
        assert_eq!(month_abbreviation(12), "Dec");
        assert_eq!(month_abbreviation(0), "");
    }

    proptest! {
        #[test]
        fn prop_previous_and_next_are_inverse(year in 2..9997i32, month in 1..=12u32) {
            let period = Period::month(year, month).unwrap();
            prop_assert_eq!(period.next().previous(), period);
            prop_assert_eq!(period.previous().next(), period);
        }

        #[test]
        fn prop_month_range_spans_days_in_month(year in 1..9998i32, month in 1..=12u32) {
            let period = Period::month(year, month).unwrap();
            let range = period.range();
            let days = (range.end - range.start).num_days();
            prop_assert_eq!(days, period.bucket_count() as i64);
        }
    }
}
