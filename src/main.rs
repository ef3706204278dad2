//! Pennywise - A personal expense tracker

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pennywise::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxExpenseRepository, SqlxSessionRepository, SqlxUserRepository},
    },
    services::{
        spawn_session_sweeper, ExpenseService, SessionService, StatisticsService, UserService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pennywise=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pennywise...");

    // Load configuration
    let config_path = Config::default_path();
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    pool.ping().await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Repositories and services
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let expense_repo = SqlxExpenseRepository::boxed(pool.clone());

    let session_service = Arc::new(SessionService::with_duration(
        session_repo,
        config.session.duration(),
    ));
    let user_service = Arc::new(UserService::new(
        user_repo,
        expense_repo.clone(),
        session_service.clone(),
    ));
    let expense_service = Arc::new(ExpenseService::new(expense_repo.clone()));
    let statistics_service = Arc::new(StatisticsService::new(expense_repo));

    // First-run bootstrap
    match config.bootstrap.credentials() {
        Some((username, password)) => {
            if let Some(admin) = user_service.bootstrap_admin(username, password).await? {
                tracing::info!("Created initial user {}", admin.username);
            }
        }
        None => {
            if user_service.count_users().await? == 0 {
                tracing::warn!(
                    "No users exist and no admin credentials are configured; \
                     set PENNYWISE_ADMIN_USER/PENNYWISE_ADMIN_PASSWORD or run adduser"
                );
            }
        }
    }

    // Expired session sweeper
    spawn_session_sweeper(session_service.clone(), config.session.cleanup_interval());

    let state = AppState {
        user_service,
        session_service,
        expense_service,
        statistics_service,
        secure_cookie: config.server.secure_cookie,
    };

    // Build router
    let app = api::build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
