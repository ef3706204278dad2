//! Statistics view model
//!
//! A single typed result shared by the month and year views.

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::period::{Period, ViewMode};
use super::ExpenseItem;

/// Query parameters for the statistics view.
///
/// Values arrive as raw strings so a form with blank or garbled fields still
/// renders: anything that does not parse means "current".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
}

impl StatsQuery {
    /// `year` selects the year view; anything else is the month view.
    pub fn view_mode(&self) -> ViewMode {
        match self.view.as_deref().map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("year") => ViewMode::Year,
            _ => ViewMode::Month,
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.year.as_deref().and_then(|y| y.trim().parse().ok())
    }

    /// Requested month, if it parses and lies in 1..=12.
    pub fn month(&self) -> Option<u32> {
        self.month
            .as_deref()
            .and_then(|m| m.trim().parse().ok())
            .filter(|m| (1..=12).contains(m))
    }
}

/// Unit the average is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageUnit {
    Day,
    Month,
}

impl AverageUnit {
    /// Short display label, e.g. `SPENT/DAY`.
    pub fn label(&self) -> &'static str {
        match self {
            AverageUnit::Day => "SPENT/DAY",
            AverageUnit::Month => "SPENT/MTH",
        }
    }
}

/// Change against the previous period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodChange {
    /// Absolute relative change in percent
    pub percentage: f64,
    /// `true` when this period's total is greater than the previous one
    pub is_increase: bool,
}

impl PeriodChange {
    /// Compare two totals. Returns `None` when there is nothing to compare
    /// against (`previous <= 0`).
    pub fn between(current: f64, previous: f64) -> Option<Self> {
        if previous > 0.0 {
            Some(Self {
                percentage: ((current - previous) / previous).abs() * 100.0,
                is_increase: current > previous,
            })
        } else {
            None
        }
    }
}

/// One category row in the breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub total: f64,
    pub count: i64,
    /// Share of the period total in percent; 0 when the total is 0
    pub percentage: f64,
    pub style: &'static Category,
}

/// One bar in the chart series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Day of month (1-based) or month of year (1-based)
    pub bucket: u32,
    pub value: f64,
    /// Axis label; empty for unlabelled buckets
    pub label: String,
}

/// Previous/next links for the view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Navigation {
    pub previous: Period,
    pub next: Period,
    /// Whether the viewed period contains today
    pub is_current: bool,
}

/// Complete statistics view for a month or a year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    pub view: ViewMode,
    pub year: i32,
    pub month: Option<u32>,
    pub period_label: String,
    pub total: f64,
    pub change: Option<PeriodChange>,
    pub has_change: bool,
    pub average_spending: f64,
    pub average_unit: AverageUnit,
    pub average_label: &'static str,
    pub categories: Vec<CategoryBreakdown>,
    pub expenses: Vec<ExpenseItem>,
    pub chart: Vec<ChartPoint>,
    pub max_chart_value: f64,
    pub navigation: Navigation,
}
