//! User service
//!
//! Account creation, login and first-run bootstrap.

use std::sync::Arc;

use thiserror::Error;

use super::password::{hash_password, verify_password};
use super::session::{SessionService, SessionServiceError};
use crate::db::repositories::{ExpenseRepository, UserRepository};
use crate::models::{Session, User};

/// User service errors
#[derive(Debug, Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SessionServiceError> for UserServiceError {
    fn from(err: SessionServiceError) -> Self {
        match err {
            SessionServiceError::InternalError(e) => UserServiceError::InternalError(e),
            SessionServiceError::SessionNotFound => {
                UserServiceError::InternalError(anyhow::anyhow!("Session vanished after creation"))
            }
        }
    }
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    expense_repo: Arc<dyn ExpenseRepository>,
    sessions: Arc<SessionService>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        expense_repo: Arc<dyn ExpenseRepository>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            user_repo,
            expense_repo,
            sessions,
        }
    }

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the username or password is empty
    /// - `UserExists` if the username is already taken
    /// - `InternalError` for hashing or database errors
    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, UserServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        if password.trim().is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        if self.user_repo.get_by_username(username).await?.is_some() {
            return Err(UserServiceError::UserExists(username.to_string()));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .user_repo
            .create(&User::new(username.to_string(), password_hash))
            .await?;

        tracing::info!("Created user {} (id {})", user.username, user.id);
        Ok(user)
    }

    /// Check credentials and start a session.
    ///
    /// Unknown usernames and wrong passwords produce the same error.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(User, Session), UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .user_repo
            .get_by_username(username.trim())
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash) {
            return Err(invalid());
        }

        let session = self.sessions.create_session(user.id).await?;
        Ok((user, session))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_username(username).await?)
    }

    pub async fn count_users(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await?)
    }

    /// Create the first account when none exists yet.
    ///
    /// Expenses recorded before accounts existed are handed to the new user.
    /// Returns `None` when users are already present.
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if self.count_users().await? > 0 {
            return Ok(None);
        }

        let user = self.create_user(username, password).await?;
        let claimed = self.expense_repo.claim_unowned(user.id).await?;
        if claimed > 0 {
            tracing::info!("Assigned {} existing expense(s) to {}", claimed, user.username);
        }

        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxExpenseRepository, SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations::run_migrations, sqlite_pool, DynDatabasePool};
    use proptest::prelude::*;

    async fn setup_test_service() -> (UserService, Arc<SessionService>, DynDatabasePool) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let sessions = Arc::new(SessionService::new(SqlxSessionRepository::boxed(
            pool.clone(),
        )));
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxExpenseRepository::boxed(pool.clone()),
            sessions.clone(),
        );
        (service, sessions, pool)
    }

    #[tokio::test]
    async fn test_create_user_hashes_password() {
        let (service, _, _) = setup_test_service().await;
        let user = service.create_user("  alice ", "secret").await.unwrap();

        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, "secret");
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates() {
        let (service, _, _) = setup_test_service().await;
        service.create_user("alice", "secret").await.unwrap();

        let result = service.create_user("alice", "other").await;
        assert!(matches!(result, Err(UserServiceError::UserExists(name)) if name == "alice"));
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let (service, _, _) = setup_test_service().await;

        assert!(matches!(
            service.create_user("   ", "secret").await,
            Err(UserServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_user("alice", "").await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_login_issues_valid_session() {
        let (service, sessions, _) = setup_test_service().await;
        let created = service.create_user("alice", "secret").await.unwrap();

        let (user, session) = service.login("alice", "secret").await.unwrap();
        assert_eq!(user.id, created.id);

        let validated = sessions.validate_session(&session.token).await.unwrap();
        assert_eq!(validated.id, created.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _, _) = setup_test_service().await;
        service.create_user("alice", "secret").await.unwrap();

        let wrong_password = service.login("alice", "nope").await.unwrap_err();
        let unknown_user = service.login("mallory", "secret").await.unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(
            wrong_password,
            UserServiceError::AuthenticationError(_)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_only_runs_on_empty_store() {
        let (service, _, pool) = setup_test_service().await;
        sqlx::query("INSERT INTO expenses (amount, description, category, kind, date) VALUES (3.0, 'legacy', 'food', 'expense', '2024-03-02 10:00:00')")
            .execute(sqlite_pool(&pool).unwrap())
            .await
            .unwrap();

        let admin = service
            .bootstrap_admin("admin", "pw")
            .await
            .unwrap()
            .expect("First bootstrap should create the admin");
        assert_eq!(service.count_users().await.unwrap(), 1);

        let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM expenses")
            .fetch_one(sqlite_pool(&pool).unwrap())
            .await
            .unwrap();
        assert_eq!(owner, Some(admin.id));

        let second = service.bootstrap_admin("other", "pw").await.unwrap();
        assert!(second.is_none());
        assert_eq!(service.count_users().await.unwrap(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_login_round_trip(
            username in "[a-z]{3,12}",
            password in "[a-zA-Z0-9!@#$%^&*]{1,24}"
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let (service, sessions, _) = setup_test_service().await;
                let created = service.create_user(&username, &password).await
                    .expect("Account creation should succeed");

                let (_, session) = service.login(&username, &password).await
                    .expect("Login should succeed with valid credentials");
                let validated = sessions.validate_session(&session.token).await
                    .expect("Session should validate");

                prop_assert_eq!(validated.id, created.id);
                Ok(())
            });
            result?;
        }
    }
}
