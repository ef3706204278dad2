//! Expense service
//!
//! Normalises user input before it reaches the store and builds the
//! current-month listing grouped by day.

use std::sync::Arc;

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::db::repositories::ExpenseRepository;
use crate::models::{
    find_category, DayGroup, Expense, ExpenseInput, ExpenseItem, ExpenseKind, ExpenseList,
    ExpenseRecord, Period, DEFAULT_DESCRIPTION, FALLBACK_CATEGORY,
};

/// Expense service errors
#[derive(Debug, Error)]
pub enum ExpenseServiceError {
    /// No expense with this id belongs to the user
    #[error("Expense not found: {0}")]
    NotFound(i64),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Expense service
pub struct ExpenseService {
    expense_repo: Arc<dyn ExpenseRepository>,
}

impl ExpenseService {
    pub fn new(expense_repo: Arc<dyn ExpenseRepository>) -> Self {
        Self { expense_repo }
    }

    /// Record a new expense. A missing date means "now" in local time.
    pub async fn create_expense(
        &self,
        user_id: i64,
        input: ExpenseInput,
    ) -> Result<Expense, ExpenseServiceError> {
        self.create_expense_at(user_id, input, Local::now().naive_local())
            .await
    }

    pub async fn create_expense_at(
        &self,
        user_id: i64,
        input: ExpenseInput,
        now: NaiveDateTime,
    ) -> Result<Expense, ExpenseServiceError> {
        let date = input.date.unwrap_or(now);
        let record = normalize(input, date)?;
        Ok(self.expense_repo.create(user_id, &record).await?)
    }

    pub async fn get_expense(&self, user_id: i64, id: i64) -> Result<Expense, ExpenseServiceError> {
        self.expense_repo
            .get(user_id, id)
            .await?
            .ok_or(ExpenseServiceError::NotFound(id))
    }

    /// Overwrite an expense. Updates must carry a date.
    pub async fn update_expense(
        &self,
        user_id: i64,
        id: i64,
        input: ExpenseInput,
    ) -> Result<Expense, ExpenseServiceError> {
        let date = input
            .date
            .ok_or_else(|| ExpenseServiceError::ValidationError("Date is required".to_string()))?;
        let record = normalize(input, date)?;

        if !self.expense_repo.update(user_id, id, &record).await? {
            return Err(ExpenseServiceError::NotFound(id));
        }

        Ok(Expense {
            id,
            amount: record.amount,
            description: record.description,
            category: record.category,
            kind: record.kind,
            date: record.date,
            user_id: Some(user_id),
        })
    }

    /// Expenses from the start of the current local month, newest first.
    pub async fn list_expenses(&self, user_id: i64) -> Result<Vec<Expense>, ExpenseServiceError> {
        self.list_expenses_at(user_id, Local::now().naive_local())
            .await
    }

    pub async fn list_expenses_at(
        &self,
        user_id: i64,
        now: NaiveDateTime,
    ) -> Result<Vec<Expense>, ExpenseServiceError> {
        let month_start = Period::month_of(now.date()).range().start;
        Ok(self.expense_repo.list_since(user_id, month_start).await?)
    }

    /// Current-month expenses grouped by calendar day.
    pub async fn list_grouped(
        &self,
        user_id: i64,
        now: NaiveDateTime,
    ) -> Result<ExpenseList, ExpenseServiceError> {
        let expenses = self.list_expenses_at(user_id, now).await?;
        Ok(group_by_day(expenses, now.date()))
    }
}

/// Validate and fill defaults on user input.
fn normalize(input: ExpenseInput, date: NaiveDateTime) -> Result<ExpenseRecord, ExpenseServiceError> {
    if !input.amount.is_finite() {
        return Err(ExpenseServiceError::ValidationError(
            "Amount must be a finite number".to_string(),
        ));
    }

    let description = match input.description.trim() {
        "" => DEFAULT_DESCRIPTION.to_string(),
        trimmed => trimmed.to_string(),
    };
    let kind = input
        .kind
        .unwrap_or_else(|| ExpenseKind::from_description(&description));

    Ok(ExpenseRecord {
        amount: input.amount,
        category: normalize_category(&input.category)?,
        kind,
        date,
        description,
    })
}

/// Lowercase a category key, defaulting blank input to `other`.
pub fn normalize_category(raw: &str) -> Result<String, ExpenseServiceError> {
    if raw.trim().is_empty() {
        return Ok(FALLBACK_CATEGORY.to_string());
    }
    find_category(raw)
        .map(|c| c.id.to_string())
        .ok_or_else(|| ExpenseServiceError::ValidationError(format!("Unknown category: {}", raw.trim())))
}

/// Heading for a day in the listing.
pub fn day_title(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "TODAY".to_string()
    } else if today.checked_sub_days(Days::new(1)) == Some(date) {
        "YESTERDAY".to_string()
    } else {
        date.format("%a, %d %b '%y").to_string().to_uppercase()
    }
}

/// Group expenses (already newest first) into per-day buckets.
pub fn group_by_day(expenses: Vec<Expense>, today: NaiveDate) -> ExpenseList {
    let mut groups: Vec<DayGroup> = Vec::new();
    let mut total = 0.0;

    for expense in expenses {
        let date = expense.date.date();
        total += expense.amount;

        match groups.last_mut() {
            Some(group) if group.date == date => {
                group.total += expense.amount;
                group.items.push(ExpenseItem::from(expense));
            }
            _ => groups.push(DayGroup {
                date,
                title: day_title(date, today),
                total: expense.amount,
                items: vec![ExpenseItem::from(expense)],
            }),
        }
    }

    groups.sort_by(|a, b| b.date.cmp(&a.date));
    ExpenseList { total, groups }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxExpenseRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::User;

    async fn setup_test_service() -> (ExpenseService, i64, i64) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let alice = users
            .create(&User::new("alice".to_string(), "h".to_string()))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob".to_string(), "h".to_string()))
            .await
            .unwrap();

        (
            ExpenseService::new(SqlxExpenseRepository::boxed(pool)),
            alice.id,
            bob.id,
        )
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn input(amount: f64, category: &str, date: Option<NaiveDateTime>) -> ExpenseInput {
        ExpenseInput {
            amount,
            description: "item".to_string(),
            category: category.to_string(),
            kind: None,
            date,
        }
    }

    #[tokio::test]
    async fn test_create_fills_defaults() {
        let (service, alice, _) = setup_test_service().await;
        let now = at(2024, 3, 15, 12, 0, 0);

        let expense = service
            .create_expense_at(
                alice,
                ExpenseInput {
                    amount: 9.99,
                    description: "   ".to_string(),
                    category: "".to_string(),
                    kind: None,
                    date: None,
                },
                now,
            )
            .await
            .unwrap();

        assert_eq!(expense.description, "Expense");
        assert_eq!(expense.category, "other");
        assert_eq!(expense.kind, ExpenseKind::Expense);
        assert_eq!(expense.date, now);
    }

    #[tokio::test]
    async fn test_income_marker_sets_kind_at_write_time() {
        let (service, alice, _) = setup_test_service().await;
        let mut salary = input(-2500.0, "other", Some(at(2024, 3, 1, 9, 0, 0)));
        salary.description = "Salary [Income]".to_string();

        let created = service.create_expense(alice, salary).await.unwrap();
        assert_eq!(created.kind, ExpenseKind::Income);

        // An explicit kind wins over the marker.
        let mut explicit = input(10.0, "food", Some(at(2024, 3, 1, 9, 0, 0)));
        explicit.description = "refund [Income]".to_string();
        explicit.kind = Some(ExpenseKind::Expense);
        let created = service.create_expense(alice, explicit).await.unwrap();
        assert_eq!(created.kind, ExpenseKind::Expense);
    }

    #[tokio::test]
    async fn test_category_is_normalised_and_validated() {
        let (service, alice, _) = setup_test_service().await;
        let date = Some(at(2024, 3, 1, 9, 0, 0));

        let created = service
            .create_expense(alice, input(1.0, "FOOD", date))
            .await
            .unwrap();
        assert_eq!(created.category, "food");

        let result = service
            .create_expense(alice, input(1.0, "yachts", date))
            .await;
        assert!(matches!(result, Err(ExpenseServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_non_finite_amount_is_rejected() {
        let (service, alice, _) = setup_test_service().await;
        let result = service
            .create_expense(alice, input(f64::NAN, "food", None))
            .await;
        assert!(matches!(result, Err(ExpenseServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_get_and_update_missing_expense() {
        let (service, alice, bob) = setup_test_service().await;
        let created = service
            .create_expense(alice, input(5.0, "food", Some(at(2024, 3, 1, 9, 0, 0))))
            .await
            .unwrap();

        assert!(matches!(
            service.get_expense(bob, created.id).await,
            Err(ExpenseServiceError::NotFound(_))
        ));
        assert!(matches!(
            service
                .update_expense(alice, 9999, input(1.0, "food", Some(at(2024, 3, 1, 9, 0, 0))))
                .await,
            Err(ExpenseServiceError::NotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_update_requires_date() {
        let (service, alice, _) = setup_test_service().await;
        let created = service
            .create_expense(alice, input(5.0, "food", Some(at(2024, 3, 1, 9, 0, 0))))
            .await
            .unwrap();

        let result = service
            .update_expense(alice, created.id, input(6.0, "food", None))
            .await;
        assert!(matches!(result, Err(ExpenseServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let (service, alice, _) = setup_test_service().await;
        let created = service
            .create_expense(alice, input(5.0, "food", Some(at(2024, 3, 1, 9, 0, 0))))
            .await
            .unwrap();

        let updated = service
            .update_expense(
                alice,
                created.id,
                input(7.5, "housing", Some(at(2024, 3, 2, 10, 0, 0))),
            )
            .await
            .unwrap();

        let fetched = service.get_expense(alice, created.id).await.unwrap();
        assert_eq!(fetched, updated);
        assert_eq!(fetched.amount, 7.5);
        assert_eq!(fetched.category, "housing");
    }

    #[tokio::test]
    async fn test_list_respects_month_boundary() {
        let (service, alice, bob) = setup_test_service().await;
        let now = at(2024, 3, 15, 12, 0, 0);

        for date in [
            at(2024, 2, 29, 23, 59, 59),
            at(2024, 3, 1, 0, 0, 0),
            at(2024, 3, 15, 11, 0, 0),
        ] {
            service
                .create_expense(alice, input(1.0, "food", Some(date)))
                .await
                .unwrap();
        }
        service
            .create_expense(bob, input(1.0, "food", Some(at(2024, 3, 10, 0, 0, 0))))
            .await
            .unwrap();

        let listed = service.list_expenses_at(alice, now).await.unwrap();
        let dates: Vec<_> = listed.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![at(2024, 3, 15, 11, 0, 0), at(2024, 3, 1, 0, 0, 0)]
        );
    }

    #[tokio::test]
    async fn test_list_grouped_by_day() {
        let (service, alice, _) = setup_test_service().await;
        let now = at(2024, 3, 15, 12, 0, 0);

        for (amount, date) in [
            (2.0, at(2024, 3, 15, 8, 0, 0)),
            (3.0, at(2024, 3, 15, 9, 0, 0)),
            (4.0, at(2024, 3, 14, 20, 0, 0)),
            (5.0, at(2024, 3, 4, 7, 0, 0)),
        ] {
            service
                .create_expense(alice, input(amount, "food", Some(date)))
                .await
                .unwrap();
        }

        let list = service.list_grouped(alice, now).await.unwrap();
        assert_eq!(list.total, 14.0);

        let titles: Vec<_> = list.groups.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, vec!["TODAY", "YESTERDAY", "MON, 04 MAR '24"]);

        assert_eq!(list.groups[0].total, 5.0);
        assert_eq!(list.groups[0].items.len(), 2);
        assert_eq!(list.groups[0].items[0].time, "09:00");
    }

    #[test]
    fn test_day_title_across_month_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(day_title(yesterday, today), "YESTERDAY");
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category(" Gifts ").unwrap(), "gifts");
        assert_eq!(normalize_category("").unwrap(), "other");
        assert!(normalize_category("crypto").is_err());
    }
}
