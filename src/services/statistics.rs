//! Statistics service
//!
//! Builds the month and year views: category breakdown, chart series,
//! comparison with the previous period, average spending and navigation.
//! All figures come from the expense repository's aggregate queries. Any
//! storage failure aborts the whole view.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::db::repositories::ExpenseRepository;
use crate::models::period::month_abbreviation;
use crate::models::{
    category_style, AverageUnit, BucketTotal, CategoryBreakdown, CategoryTotal, ChartPoint,
    ExpenseItem, Navigation, Period, PeriodChange, StatsQuery, StatsView, ViewMode,
};

/// Statistics service errors
#[derive(Debug, Error)]
pub enum StatisticsServiceError {
    /// Requested period cannot be represented
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Statistics service
pub struct StatisticsService {
    expense_repo: Arc<dyn ExpenseRepository>,
}

impl StatisticsService {
    pub fn new(expense_repo: Arc<dyn ExpenseRepository>) -> Self {
        Self { expense_repo }
    }

    /// Resolve a query into a period and build its view.
    ///
    /// Missing values default to the period containing `today`. A month
    /// outside 1..=12 also falls back to the current month.
    pub async fn view(
        &self,
        user_id: i64,
        query: &StatsQuery,
        today: NaiveDate,
    ) -> Result<StatsView, StatisticsServiceError> {
        let period = resolve_period(query, today)?;
        self.build(user_id, period, today).await
    }

    pub async fn month_view(
        &self,
        user_id: i64,
        year: i32,
        month: u32,
        today: NaiveDate,
    ) -> Result<StatsView, StatisticsServiceError> {
        let period = Period::month(year, month).ok_or_else(|| {
            StatisticsServiceError::InvalidPeriod(format!("{}-{:02}", year, month))
        })?;
        self.build(user_id, period, today).await
    }

    pub async fn year_view(
        &self,
        user_id: i64,
        year: i32,
        today: NaiveDate,
    ) -> Result<StatsView, StatisticsServiceError> {
        let period = Period::year(year)
            .ok_or_else(|| StatisticsServiceError::InvalidPeriod(year.to_string()))?;
        self.build(user_id, period, today).await
    }

    async fn build(
        &self,
        user_id: i64,
        period: Period,
        today: NaiveDate,
    ) -> Result<StatsView, StatisticsServiceError> {
        let range = period.range();
        let previous_range = period.previous().range();

        let category_totals = self.expense_repo.category_totals(user_id, &range).await?;
        let expenses = self.expense_repo.list_between(user_id, &range).await?;
        let buckets = match period {
            Period::Month { .. } => self.expense_repo.daily_totals(user_id, &range).await?,
            Period::Year { .. } => self.expense_repo.monthly_totals(user_id, &range).await?,
        };
        let total = self.expense_repo.total(user_id, &range).await?;
        let previous_total = self.expense_repo.total(user_id, &previous_range).await?;

        let chart = chart_series(&period, &buckets);
        let max_chart_value = chart.iter().map(|p| p.value).fold(0.0, f64::max);
        let change = PeriodChange::between(total, previous_total);
        let (average_spending, average_unit) = average(&period, total);

        Ok(StatsView {
            view: period.mode(),
            year: period.year_number(),
            month: period.month_number(),
            period_label: period.label(),
            total,
            has_change: change.is_some(),
            change,
            average_spending,
            average_unit,
            average_label: average_unit.label(),
            categories: category_breakdown(category_totals, total),
            expenses: expenses.into_iter().map(ExpenseItem::from).collect(),
            chart,
            max_chart_value,
            navigation: Navigation {
                previous: period.previous(),
                next: period.next(),
                is_current: period.contains(today),
            },
        })
    }
}

/// Turn query parameters into a period, defaulting to `today`.
///
/// Blank or unparsable values fall back to the current year or month. A
/// parsed year outside the supported range is an error.
pub fn resolve_period(query: &StatsQuery, today: NaiveDate) -> Result<Period, StatisticsServiceError> {
    match (query.view_mode(), query.year()) {
        (ViewMode::Year, None) => Ok(Period::year_of(today)),
        (ViewMode::Year, Some(year)) => {
            Period::year(year).ok_or_else(|| StatisticsServiceError::InvalidPeriod(year.to_string()))
        }
        (ViewMode::Month, None) if query.month().is_none() => Ok(Period::month_of(today)),
        (ViewMode::Month, year) => {
            let year = year.unwrap_or_else(|| today.year());
            let month = query.month().unwrap_or_else(|| today.month());
            Period::month(year, month).ok_or_else(|| {
                StatisticsServiceError::InvalidPeriod(format!("{}-{:02}", year, month))
            })
        }
    }
}

/// Attach percentages and styles to category totals.
///
/// Percentages are 0 when the period total is 0.
pub fn category_breakdown(totals: Vec<CategoryTotal>, period_total: f64) -> Vec<CategoryBreakdown> {
    totals
        .into_iter()
        .map(|t| CategoryBreakdown {
            percentage: if period_total != 0.0 {
                t.total / period_total * 100.0
            } else {
                0.0
            },
            style: category_style(&t.category),
            category: t.category,
            total: t.total,
            count: t.count,
        })
        .collect()
}

/// Full chart series for a period with missing buckets filled with 0.
///
/// Month charts label days 1, 10, 20 and the last day; year charts label
/// every month.
pub fn chart_series(period: &Period, buckets: &[BucketTotal]) -> Vec<ChartPoint> {
    let count = period.bucket_count();

    (1..=count)
        .map(|bucket| {
            let value = buckets
                .iter()
                .find(|b| b.bucket == bucket)
                .map(|b| b.total)
                .unwrap_or(0.0);
            let label = match period {
                Period::Month { .. } if matches!(bucket, 1 | 10 | 20) || bucket == count => {
                    bucket.to_string()
                }
                Period::Month { .. } => String::new(),
                Period::Year { .. } => month_abbreviation(bucket).to_string(),
            };
            ChartPoint {
                bucket,
                value,
                label,
            }
        })
        .collect()
}

/// Average spending per day (month view) or per month (year view).
pub fn average(period: &Period, total: f64) -> (f64, AverageUnit) {
    let unit = match period {
        Period::Month { .. } => AverageUnit::Day,
        Period::Year { .. } => AverageUnit::Month,
    };
    (total / period.bucket_count() as f64, unit)
}
