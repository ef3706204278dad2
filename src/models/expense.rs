//! Expense model
//!
//! An expense is one dated money movement owned by a user. Amounts are
//! stored as entered; income is usually recorded with a negative amount and
//! flagged through [`ExpenseKind::Income`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::category::{category_style, Category};

/// Description marker that flags a row as income when no kind is given.
pub const INCOME_MARKER: &str = "[Income]";

/// Description used when the user leaves it blank.
pub const DEFAULT_DESCRIPTION: &str = "Expense";

/// Stored expense row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub kind: ExpenseKind,
    /// Local wall-clock time the money moved
    pub date: NaiveDateTime,
    /// Owner; `None` only for rows imported before accounts existed
    pub user_id: Option<i64>,
}

impl Expense {
    pub fn is_income(&self) -> bool {
        self.kind == ExpenseKind::Income
    }
}

/// Whether a row is spending or income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseKind {
    #[default]
    Expense,
    Income,
}

impl ExpenseKind {
    /// Derive the kind from a description when the caller did not pick one.
    pub fn from_description(description: &str) -> Self {
        if description.contains(INCOME_MARKER) {
            Self::Income
        } else {
            Self::Expense
        }
    }
}

impl fmt::Display for ExpenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpenseKind::Expense => write!(f, "expense"),
            ExpenseKind::Income => write!(f, "income"),
        }
    }
}

impl FromStr for ExpenseKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expense" => Ok(ExpenseKind::Expense),
            "income" => Ok(ExpenseKind::Income),
            _ => Err(anyhow::anyhow!("Invalid expense kind: {}", s)),
        }
    }
}

/// Input for creating or updating an expense.
///
/// `date` may be left empty on create (it becomes "now"); updates require it.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ExpenseInput {
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub kind: Option<ExpenseKind>,
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
}

/// A fully normalised row ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRecord {
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub kind: ExpenseKind,
    pub date: NaiveDateTime,
}

/// Per-category sum over a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: i64,
}

/// Sum for one day-of-month or month-of-year bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketTotal {
    pub bucket: u32,
    pub total: f64,
}

/// Expense plus the presentation bits a client needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseItem {
    #[serde(flatten)]
    pub expense: Expense,
    /// `HH:MM` in local time
    pub time: String,
    pub is_income: bool,
    pub style: &'static Category,
}

impl From<Expense> for ExpenseItem {
    fn from(expense: Expense) -> Self {
        let time = expense.date.format("%H:%M").to_string();
        let style = category_style(&expense.category);
        Self {
            is_income: expense.is_income(),
            expense,
            time,
            style,
        }
    }
}

/// Expenses that fall on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    /// `TODAY`, `YESTERDAY`, or e.g. `MON, 04 MAR '24`
    pub title: String,
    pub total: f64,
    pub items: Vec<ExpenseItem>,
}

/// The current-month listing, newest day first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseList {
    pub total: f64,
    pub groups: Vec<DayGroup>,
}
