//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type returned by every handler
//! - The session gate that protects the expense and statistics routes

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::{
    ExpenseService, ExpenseServiceError, SessionService, SessionServiceError, StatisticsService,
    StatisticsServiceError, UserService, UserServiceError,
};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub session_service: Arc<SessionService>,
    pub expense_service: Arc<ExpenseService>,
    pub statistics_service: Arc<StatisticsService>,
    /// Add `Secure` to session cookies
    pub secure_cookie: bool,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(name) => {
                ApiError::conflict(format!("user {} already exists", name))
            }
            UserServiceError::InternalError(e) => {
                tracing::error!("User service failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<SessionServiceError> for ApiError {
    fn from(err: SessionServiceError) -> Self {
        match err {
            SessionServiceError::SessionNotFound => {
                ApiError::unauthorized("Invalid or expired session")
            }
            SessionServiceError::InternalError(e) => {
                tracing::error!("Session store failure: {:#}", e);
                ApiError::internal_error("Session validation failed")
            }
        }
    }
}

impl From<ExpenseServiceError> for ApiError {
    fn from(err: ExpenseServiceError) -> Self {
        match err {
            ExpenseServiceError::NotFound(id) => {
                ApiError::not_found(format!("Expense {} not found", id))
            }
            ExpenseServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ExpenseServiceError::InternalError(e) => {
                tracing::error!("Expense store failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<StatisticsServiceError> for ApiError {
    fn from(err: StatisticsServiceError) -> Self {
        match err {
            StatisticsServiceError::InvalidPeriod(period) => {
                ApiError::validation_error(format!("Invalid period: {}", period))
            }
            StatisticsServiceError::InternalError(e) => {
                tracing::error!("Statistics query failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

// ============================================================================
// Cookies and redirects
// ============================================================================

/// Read the session token from the `Cookie` header. Empty values count as absent.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|cookie| cookie.trim().strip_prefix("session="))
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// `Set-Cookie` value carrying `token` for `max_age`.
pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        max_age.num_seconds(),
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::zero(), secure)
}

/// 302 Found to `location`, optionally setting a cookie.
pub fn found(location: &'static str, cookie: Option<String>) -> Response {
    let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    if let Some(cookie) = cookie {
        append_cookie(&mut response, &cookie);
    }
    response
}

fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Refusing to send malformed cookie: {}", e),
    }
}

// ============================================================================
// Session gate
// ============================================================================

/// Session middleware for protected routes.
///
/// Missing cookies redirect to `/login`. Unknown or expired sessions also
/// clear the cookie. A renewed session gets a fresh cookie on the response.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_session_token(request.headers()) else {
        return found("/login", None);
    };

    let auth = match state.session_service.authenticate(&token, Utc::now()).await {
        Ok(auth) => auth,
        Err(SessionServiceError::SessionNotFound) => {
            return found("/login", Some(clear_session_cookie(state.secure_cookie)));
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser(auth.user));
    let mut response = next.run(request).await;

    if auth.renewed_until.is_some() {
        let cookie = session_cookie(
            &token,
            state.session_service.duration(),
            state.secure_cookie,
        );
        append_cookie(&mut response, &cookie);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_session_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", Duration::days(30), false);
        assert_eq!(
            cookie,
            "session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=2592000"
        );

        let secure = session_cookie("tok", Duration::days(1), true);
        assert!(secure.ends_with("; Secure"));

        let cleared = clear_session_cookie(false);
        assert!(cleared.starts_with("session=;"));
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal_error("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let err: ApiError = ExpenseServiceError::NotFound(7).into();
        assert_eq!(err.error.code, "NOT_FOUND");
        let err: ApiError = UserServiceError::UserExists("alice".to_string()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
