//! Data models
//!
//! Database entities (User, Session, Expense), the static category registry,
//! calendar periods and the statistics view types.

pub mod category;
mod expense;
pub mod period;
mod session;
mod statistics;
mod user;

pub use category::{category_style, find_category, Category, CATEGORIES, FALLBACK_CATEGORY};
pub use expense::{
    BucketTotal, CategoryTotal, DayGroup, Expense, ExpenseInput, ExpenseItem, ExpenseKind,
    ExpenseList, ExpenseRecord, DEFAULT_DESCRIPTION, INCOME_MARKER,
};
pub use period::{days_in_month, DateRange, Period, ViewMode};
pub use session::{Session, SessionInfo};
pub use statistics::{
    AverageUnit, CategoryBreakdown, ChartPoint, Navigation, PeriodChange, StatsQuery, StatsView,
};
pub use user::User;
