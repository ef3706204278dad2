//! Expense repository
//!
//! CRUD and period aggregates for expenses. Every operation is scoped to one
//! user; rows belonging to someone else (or to nobody) are invisible.
//!
//! Period queries take a half-open [`DateRange`] in local wall-clock time.

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::{BucketTotal, CategoryTotal, DateRange, Expense, ExpenseKind, ExpenseRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Expense repository trait
#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Insert a new expense for `user_id`
    async fn create(&self, user_id: i64, record: &ExpenseRecord) -> Result<Expense>;

    /// Get one expense owned by `user_id`
    async fn get(&self, user_id: i64, id: i64) -> Result<Option<Expense>>;

    /// Overwrite an expense. Returns `false` when no owned row matched.
    async fn update(&self, user_id: i64, id: i64, record: &ExpenseRecord) -> Result<bool>;

    /// Expenses dated at or after `since`, newest first
    async fn list_since(&self, user_id: i64, since: NaiveDateTime) -> Result<Vec<Expense>>;

    /// Expenses inside `range`, newest first
    async fn list_between(&self, user_id: i64, range: &DateRange) -> Result<Vec<Expense>>;

    /// Sum and count per category inside `range`, largest total first
    async fn category_totals(&self, user_id: i64, range: &DateRange)
        -> Result<Vec<CategoryTotal>>;

    /// Sum per day of month inside `range`
    async fn daily_totals(&self, user_id: i64, range: &DateRange) -> Result<Vec<BucketTotal>>;

    /// Sum per month of year inside `range`
    async fn monthly_totals(&self, user_id: i64, range: &DateRange) -> Result<Vec<BucketTotal>>;

    /// Sum of all amounts inside `range` (0 when empty)
    async fn total(&self, user_id: i64, range: &DateRange) -> Result<f64>;

    /// Give every ownerless expense to `user_id`; returns how many rows moved
    async fn claim_unowned(&self, user_id: i64) -> Result<u64>;
}

/// SQLx-based expense repository implementation
pub struct SqlxExpenseRepository {
    pool: DynDatabasePool,
}

impl SqlxExpenseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ExpenseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ExpenseRepository for SqlxExpenseRepository {
    async fn create(&self, user_id: i64, record: &ExpenseRecord) -> Result<Expense> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_expense_sqlite(sqlite_pool(&self.pool)?, user_id, record).await
            }
            DatabaseDriver::Mysql => {
                create_expense_mysql(mysql_pool(&self.pool)?, user_id, record).await
            }
        }
    }

    async fn get(&self, user_id: i64, id: i64) -> Result<Option<Expense>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_expense_sqlite(sqlite_pool(&self.pool)?, user_id, id).await,
            DatabaseDriver::Mysql => get_expense_mysql(mysql_pool(&self.pool)?, user_id, id).await,
        }
    }

    async fn update(&self, user_id: i64, id: i64, record: &ExpenseRecord) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_expense_sqlite(sqlite_pool(&self.pool)?, user_id, id, record).await
            }
            DatabaseDriver::Mysql => {
                update_expense_mysql(mysql_pool(&self.pool)?, user_id, id, record).await
            }
        }
    }

    async fn list_since(&self, user_id: i64, since: NaiveDateTime) -> Result<Vec<Expense>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_since_sqlite(sqlite_pool(&self.pool)?, user_id, since).await
            }
            DatabaseDriver::Mysql => list_since_mysql(mysql_pool(&self.pool)?, user_id, since).await,
        }
    }

    async fn list_between(&self, user_id: i64, range: &DateRange) -> Result<Vec<Expense>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_between_sqlite(sqlite_pool(&self.pool)?, user_id, range).await
            }
            DatabaseDriver::Mysql => {
                list_between_mysql(mysql_pool(&self.pool)?, user_id, range).await
            }
        }
    }

    async fn category_totals(
        &self,
        user_id: i64,
        range: &DateRange,
    ) -> Result<Vec<CategoryTotal>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                category_totals_sqlite(sqlite_pool(&self.pool)?, user_id, range).await
            }
            DatabaseDriver::Mysql => {
                category_totals_mysql(mysql_pool(&self.pool)?, user_id, range).await
            }
        }
    }

    async fn daily_totals(&self, user_id: i64, range: &DateRange) -> Result<Vec<BucketTotal>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                bucket_totals_sqlite(sqlite_pool(&self.pool)?, SQLITE_DAY_BUCKET, user_id, range)
                    .await
            }
            DatabaseDriver::Mysql => {
                bucket_totals_mysql(mysql_pool(&self.pool)?, MYSQL_DAY_BUCKET, user_id, range).await
            }
        }
    }

    async fn monthly_totals(&self, user_id: i64, range: &DateRange) -> Result<Vec<BucketTotal>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                bucket_totals_sqlite(sqlite_pool(&self.pool)?, SQLITE_MONTH_BUCKET, user_id, range)
                    .await
            }
            DatabaseDriver::Mysql => {
                bucket_totals_mysql(mysql_pool(&self.pool)?, MYSQL_MONTH_BUCKET, user_id, range)
                    .await
            }
        }
    }

    async fn total(&self, user_id: i64, range: &DateRange) -> Result<f64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => total_sqlite(sqlite_pool(&self.pool)?, user_id, range).await,
            DatabaseDriver::Mysql => total_mysql(mysql_pool(&self.pool)?, user_id, range).await,
        }
    }

    async fn claim_unowned(&self, user_id: i64) -> Result<u64> {
        let query = "UPDATE expenses SET user_id = ? WHERE user_id IS NULL";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(query)
                    .bind(user_id)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .context("Failed to claim unowned expenses")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query(query)
                    .bind(user_id)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .context("Failed to claim unowned expenses")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }
}

const EXPENSE_COLUMNS: &str = "id, amount, description, category, kind, date, user_id";

const SQLITE_DAY_BUCKET: &str = "CAST(strftime('%d', date) AS INTEGER)";
const SQLITE_MONTH_BUCKET: &str = "CAST(strftime('%m', date) AS INTEGER)";
const MYSQL_DAY_BUCKET: &str = "CAST(DAYOFMONTH(date) AS SIGNED)";
const MYSQL_MONTH_BUCKET: &str = "CAST(MONTH(date) AS SIGNED)";

fn bucket_from_i64(bucket: i64) -> Result<u32> {
    u32::try_from(bucket).with_context(|| format!("Invalid date bucket: {}", bucket))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_expense_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    record: &ExpenseRecord,
) -> Result<Expense> {
    let result = sqlx::query(
        r#"
        INSERT INTO expenses (amount, description, category, kind, date, user_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.amount)
    .bind(&record.description)
    .bind(&record.category)
    .bind(record.kind.to_string())
    .bind(record.date)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to create expense")?;

    Ok(expense_from_record(result.last_insert_rowid(), user_id, record))
}

async fn get_expense_sqlite(pool: &SqlitePool, user_id: i64, id: i64) -> Result<Option<Expense>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE id = ? AND user_id = ?",
        EXPENSE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get expense")?;

    row.map(|row| row_to_expense_sqlite(&row)).transpose()
}

async fn update_expense_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    id: i64,
    record: &ExpenseRecord,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE expenses
        SET amount = ?, description = ?, category = ?, kind = ?, date = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(record.amount)
    .bind(&record.description)
    .bind(&record.category)
    .bind(record.kind.to_string())
    .bind(record.date)
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to update expense")?;

    Ok(result.rows_affected() > 0)
}

async fn list_since_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    since: NaiveDateTime,
) -> Result<Vec<Expense>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE user_id = ? AND date >= ? ORDER BY date DESC, id DESC",
        EXPENSE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(since)
        .fetch_all(pool)
        .await
        .context("Failed to list expenses")?;

    rows.iter().map(row_to_expense_sqlite).collect()
}

async fn list_between_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    range: &DateRange,
) -> Result<Vec<Expense>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE user_id = ? AND date >= ? AND date < ? ORDER BY date DESC, id DESC",
        EXPENSE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(pool)
        .await
        .context("Failed to list expenses for period")?;

    rows.iter().map(row_to_expense_sqlite).collect()
}

async fn category_totals_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    range: &DateRange,
) -> Result<Vec<CategoryTotal>> {
    let rows = sqlx::query(
        r#"
        SELECT category, COALESCE(SUM(amount), 0.0) AS total, COUNT(*) AS count
        FROM expenses
        WHERE user_id = ? AND date >= ? AND date < ?
        GROUP BY category
        ORDER BY total DESC, category ASC
        "#,
    )
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await
    .context("Failed to get category totals")?;

    rows.iter()
        .map(|row| {
            Ok(CategoryTotal {
                category: row.try_get("category")?,
                total: row.try_get("total")?,
                count: row.try_get("count")?,
            })
        })
        .collect()
}

async fn bucket_totals_sqlite(
    pool: &SqlitePool,
    bucket_expr: &str,
    user_id: i64,
    range: &DateRange,
) -> Result<Vec<BucketTotal>> {
    let sql = format!(
        r#"
        SELECT {bucket_expr} AS bucket, COALESCE(SUM(amount), 0.0) AS total
        FROM expenses
        WHERE user_id = ? AND date >= ? AND date < ?
        GROUP BY bucket
        ORDER BY bucket
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(pool)
        .await
        .context("Failed to get period totals")?;

    rows.iter()
        .map(|row| {
            Ok(BucketTotal {
                bucket: bucket_from_i64(row.try_get("bucket")?)?,
                total: row.try_get("total")?,
            })
        })
        .collect()
}

async fn total_sqlite(pool: &SqlitePool, user_id: i64, range: &DateRange) -> Result<f64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(amount), 0.0) AS total
        FROM expenses
        WHERE user_id = ? AND date >= ? AND date < ?
        "#,
    )
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_one(pool)
    .await
    .context("Failed to get period total")?;

    Ok(row.try_get("total")?)
}

fn row_to_expense_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Expense> {
    let kind: String = row.try_get("kind")?;
    Ok(Expense {
        id: row.try_get("id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        kind: kind.parse::<ExpenseKind>()?,
        date: row.try_get("date")?,
        user_id: row.try_get("user_id")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_expense_mysql(
    pool: &MySqlPool,
    user_id: i64,
    record: &ExpenseRecord,
) -> Result<Expense> {
    let result = sqlx::query(
        r#"
        INSERT INTO expenses (amount, description, category, kind, date, user_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.amount)
    .bind(&record.description)
    .bind(&record.category)
    .bind(record.kind.to_string())
    .bind(record.date)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to create expense")?;

    Ok(expense_from_record(
        result.last_insert_id() as i64,
        user_id,
        record,
    ))
}

async fn get_expense_mysql(pool: &MySqlPool, user_id: i64, id: i64) -> Result<Option<Expense>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE id = ? AND user_id = ?",
        EXPENSE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get expense")?;

    row.map(|row| row_to_expense_mysql(&row)).transpose()
}

async fn update_expense_mysql(
    pool: &MySqlPool,
    user_id: i64,
    id: i64,
    record: &ExpenseRecord,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE expenses
        SET amount = ?, description = ?, category = ?, kind = ?, date = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(record.amount)
    .bind(&record.description)
    .bind(&record.category)
    .bind(record.kind.to_string())
    .bind(record.date)
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to update expense")?;

    // MySQL reports only changed rows; fall back to an existence check so an
    // identical overwrite is not mistaken for a missing row.
    if result.rows_affected() > 0 {
        return Ok(true);
    }
    Ok(get_expense_mysql(pool, user_id, id).await?.is_some())
}

async fn list_since_mysql(
    pool: &MySqlPool,
    user_id: i64,
    since: NaiveDateTime,
) -> Result<Vec<Expense>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE user_id = ? AND date >= ? ORDER BY date DESC, id DESC",
        EXPENSE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(since)
        .fetch_all(pool)
        .await
        .context("Failed to list expenses")?;

    rows.iter().map(row_to_expense_mysql).collect()
}

async fn list_between_mysql(
    pool: &MySqlPool,
    user_id: i64,
    range: &DateRange,
) -> Result<Vec<Expense>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE user_id = ? AND date >= ? AND date < ? ORDER BY date DESC, id DESC",
        EXPENSE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(pool)
        .await
        .context("Failed to list expenses for period")?;

    rows.iter().map(row_to_expense_mysql).collect()
}

async fn category_totals_mysql(
    pool: &MySqlPool,
    user_id: i64,
    range: &DateRange,
) -> Result<Vec<CategoryTotal>> {
    let rows = sqlx::query(
        r#"
        SELECT category, COALESCE(SUM(amount), 0e0) AS total, COUNT(*) AS count
        FROM expenses
        WHERE user_id = ? AND date >= ? AND date < ?
        GROUP BY category
        ORDER BY total DESC, category ASC
        "#,
    )
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await
    .context("Failed to get category totals")?;

    rows.iter()
        .map(|row| {
            Ok(CategoryTotal {
                category: row.try_get("category")?,
                total: row.try_get("total")?,
                count: row.try_get("count")?,
            })
        })
        .collect()
}

async fn bucket_totals_mysql(
    pool: &MySqlPool,
    bucket_expr: &str,
    user_id: i64,
    range: &DateRange,
) -> Result<Vec<BucketTotal>> {
    let sql = format!(
        r#"
        SELECT {bucket_expr} AS bucket, COALESCE(SUM(amount), 0e0) AS total
        FROM expenses
        WHERE user_id = ? AND date >= ? AND date < ?
        GROUP BY bucket
        ORDER BY bucket
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(pool)
        .await
        .context("Failed to get period totals")?;

    rows.iter()
        .map(|row| {
            Ok(BucketTotal {
                bucket: bucket_from_i64(row.try_get("bucket")?)?,
                total: row.try_get("total")?,
            })
        })
        .collect()
}

async fn total_mysql(pool: &MySqlPool, user_id: i64, range: &DateRange) -> Result<f64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(amount), 0e0) AS total
        FROM expenses
        WHERE user_id = ? AND date >= ? AND date < ?
        "#,
    )
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_one(pool)
    .await
    .context("Failed to get period total")?;

    Ok(row.try_get("total")?)
}

fn row_to_expense_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Expense> {
    let kind: String = row.try_get("kind")?;
    Ok(Expense {
        id: row.try_get("id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        kind: kind.parse::<ExpenseKind>()?,
        date: row.try_get("date")?,
        user_id: row.try_get("user_id")?,
    })
}

fn expense_from_record(id: i64, user_id: i64, record: &ExpenseRecord) -> Expense {
    Expense {
        id,
        amount: record.amount,
        description: record.description.clone(),
        category: record.category.clone(),
        kind: record.kind,
        date: record.date,
        user_id: Some(user_id),
    }
}
