//! API layer - HTTP handlers and routing
//!
//! Public routes handle login and logout. Everything else sits behind the
//! session gate in [`middleware::require_session`].

pub mod auth;
pub mod expenses;
pub mod middleware;
pub mod statistics;


use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route(
            "/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route(
            "/expenses/{id}",
            get(expenses::get_expense)
                .put(expenses::update_expense)
                .post(expenses::update_expense),
        )
        .route("/statistics", get(statistics::get_statistics))
        .route("/categories", get(statistics::list_categories))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
