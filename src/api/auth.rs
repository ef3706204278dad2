//! Authentication endpoints
//!
//! - GET /          - Redirect to the expense listing
//! - GET /login     - Redirect if already signed in
//! - POST /login    - Form login, sets the session cookie
//! - POST /logout   - Drop the session and clear the cookie
//! - GET /me        - Current user (behind the session gate)

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    clear_session_cookie, extract_session_token, found, session_cookie, ApiError, AppState,
    AuthenticatedUser,
};
use crate::models::User;
use crate::services::SessionServiceError;

/// Login form body
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginStatus {
    pub authenticated: bool,
}

/// GET /
pub async fn index() -> Response {
    found("/expenses", None)
}

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&headers) {
        match state.session_service.validate_session(&token).await {
            Ok(_) => return Ok(found("/expenses", None)),
            Err(SessionServiceError::SessionNotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Json(LoginStatus {
        authenticated: false,
    })
    .into_response())
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let (username, password) = match (form.username, form.password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u, p),
        _ => {
            return Err(ApiError::validation_error(
                "username and password are required",
            ))
        }
    };

    let (user, session) = state.user_service.login(&username, &password).await?;
    tracing::info!("User {} logged in", user.username);

    let cookie = session_cookie(
        &session.token,
        state.session_service.duration(),
        state.secure_cookie,
    );
    Ok(found("/expenses", Some(cookie)))
}

/// POST /logout
///
/// Always clears the cookie, even when the session could not be deleted.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(e) = state.session_service.delete_session(&token).await {
            tracing::error!("Failed to delete session on logout: {}", e);
        }
    }

    found("/login", Some(clear_session_cookie(state.secure_cookie)))
}

/// GET /me
pub async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}
