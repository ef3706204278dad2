//! Statistics and category endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Local;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Category, StatsQuery, StatsView, CATEGORIES};

/// GET /statistics?view=&year=&month=
pub async fn get_statistics(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsView>, ApiError> {
    let today = Local::now().date_naive();
    let view = state
        .statistics_service
        .view(user.id, &query, today)
        .await?;
    Ok(Json(view))
}

/// GET /categories
pub async fn list_categories() -> Json<&'static [Category]> {
    Json(CATEGORIES)
}
