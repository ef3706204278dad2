//! Expense endpoints
//!
//! Form fields arrive as strings and are parsed here, so a malformed amount or
//! date becomes a 400 before the service is involved.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Form, Json,
};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Expense, ExpenseInput, ExpenseKind, ExpenseList};

/// Accepted layouts for the `date` field (HTML `datetime-local`)
const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Raw expense form body
#[derive(Debug, Default, Deserialize)]
pub struct ExpenseForm {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl ExpenseForm {
    /// Parse the form into service input.
    pub fn into_input(self) -> Result<ExpenseInput, ApiError> {
        let amount = self
            .amount
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation_error("amount is required"))?
            .parse::<f64>()
            .map_err(|_| ApiError::validation_error("invalid amount"))?;

        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<ExpenseKind>()
                    .map_err(|e| ApiError::validation_error(e.to_string()))?,
            ),
        };

        let date = self
            .date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation_error("date is required"))?;

        Ok(ExpenseInput {
            amount,
            description: self.description.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            kind,
            date: Some(parse_date(date)?),
        })
    }
}

/// Parse a form date in any of the accepted layouts.
pub fn parse_date(raw: &str) -> Result<NaiveDateTime, ApiError> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ApiError::validation_error("invalid date"))
}

/// GET /expenses
pub async fn list_expenses(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ExpenseList>, ApiError> {
    let list = state
        .expense_service
        .list_grouped(user.id, Local::now().naive_local())
        .await?;
    Ok(Json(list))
}

/// POST /expenses
pub async fn create_expense(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<ExpenseForm>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let input = form.into_input()?;
    let expense = state.expense_service.create_expense(user.id, input).await?;
    tracing::debug!("User {} recorded expense {}", user.id, expense.id);
    Ok((StatusCode::CREATED, Json(expense)))
}

/// GET /expenses/{id}
pub async fn get_expense(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(state.expense_service.get_expense(user.id, id).await?))
}

/// PUT or POST /expenses/{id}
pub async fn update_expense(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Form(form): Form<ExpenseForm>,
) -> Result<Json<Expense>, ApiError> {
    let input = form.into_input()?;
    let expense = state
        .expense_service
        .update_expense(user.id, id, input)
        .await?;
    Ok(Json(expense))
}
