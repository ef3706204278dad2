//! Session repository
//!
//! Server-side session rows for cookie authentication.
//!
//! A row whose `expires_at` is at or before `now` is treated as absent by
//! every lookup, so correctness never depends on the background sweep.

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::{Session, SessionInfo, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session with `last_activity = now`
    async fn create(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Session>;

    /// Look up a session that is still valid at `now`, joined with its user
    async fn find_valid(&self, token: &str, now: DateTime<Utc>) -> Result<Option<SessionInfo>>;

    /// Move the expiry and stamp `last_activity = now`
    async fn renew(&self, token: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>)
        -> Result<()>;

    /// Delete a session. Deleting an unknown token is not an error.
    async fn delete(&self, token: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete sessions with `expires_at <= now`; returns how many were removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let session = Session {
            token: token.to_string(),
            user_id,
            expires_at,
            last_activity: now,
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(sqlite_pool(&self.pool)?, &session).await?
            }
            DatabaseDriver::Mysql => create_session_mysql(mysql_pool(&self.pool)?, &session).await?,
        }
        Ok(session)
    }

    async fn find_valid(&self, token: &str, now: DateTime<Utc>) -> Result<Option<SessionInfo>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_valid_session_sqlite(sqlite_pool(&self.pool)?, token, now).await
            }
            DatabaseDriver::Mysql => {
                find_valid_session_mysql(mysql_pool(&self.pool)?, token, now).await
            }
        }
    }

    async fn renew(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                renew_session_sqlite(sqlite_pool(&self.pool)?, token, expires_at, now).await
            }
            DatabaseDriver::Mysql => {
                renew_session_mysql(mysql_pool(&self.pool)?, token, expires_at, now).await
            }
        }
    }

    async fn delete(&self, token: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_session_sqlite(sqlite_pool(&self.pool)?, token).await,
            DatabaseDriver::Mysql => delete_session_mysql(mysql_pool(&self.pool)?, token).await,
        }
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_sessions_by_user_sqlite(sqlite_pool(&self.pool)?, user_id).await
            }
            DatabaseDriver::Mysql => {
                delete_sessions_by_user_mysql(mysql_pool(&self.pool)?, user_id).await
            }
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_expired_sessions_sqlite(sqlite_pool(&self.pool)?, now).await
            }
            DatabaseDriver::Mysql => {
                delete_expired_sessions_mysql(mysql_pool(&self.pool)?, now).await
            }
        }
    }
}

const FIND_VALID_SQL: &str = r#"
    SELECT s.expires_at, s.last_activity,
           u.id AS user_id, u.username, u.password_hash, u.created_at
    FROM sessions s
    JOIN users u ON u.id = s.user_id
    WHERE s.token = ? AND s.expires_at > ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (token, user_id, expires_at, last_activity)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.token)
    .bind(session.user_id)
    .bind(session.expires_at)
    .bind(session.last_activity)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(())
}

async fn find_valid_session_sqlite(
    pool: &SqlitePool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionInfo>> {
    let row = sqlx::query(FIND_VALID_SQL)
        .bind(token)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to validate session")?;

    row.map(|row| row_to_session_info_sqlite(&row)).transpose()
}

async fn renew_session_sqlite(
    pool: &SqlitePool,
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE sessions SET expires_at = ?, last_activity = ? WHERE token = ?")
        .bind(expires_at)
        .bind(now)
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to renew session")?;

    Ok(())
}

async fn delete_session_sqlite(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to delete session")?;

    Ok(())
}

async fn delete_sessions_by_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to delete sessions by user")?;

    Ok(result.rows_affected())
}

async fn delete_expired_sessions_sqlite(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired sessions")?;

    Ok(result.rows_affected())
}

fn row_to_session_info_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<SessionInfo> {
    Ok(SessionInfo {
        user: User {
            id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        },
        last_activity: row.try_get("last_activity")?,
        expires_at: row.try_get("expires_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (token, user_id, expires_at, last_activity)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.token)
    .bind(session.user_id)
    .bind(session.expires_at)
    .bind(session.last_activity)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(())
}

async fn find_valid_session_mysql(
    pool: &MySqlPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionInfo>> {
    let row = sqlx::query(FIND_VALID_SQL)
        .bind(token)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to validate session")?;

    row.map(|row| row_to_session_info_mysql(&row)).transpose()
}

async fn renew_session_mysql(
    pool: &MySqlPool,
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE sessions SET expires_at = ?, last_activity = ? WHERE token = ?")
        .bind(expires_at)
        .bind(now)
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to renew session")?;

    Ok(())
}

async fn delete_session_mysql(pool: &MySqlPool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to delete session")?;

    Ok(())
}

async fn delete_sessions_by_user_mysql(pool: &MySqlPool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to delete sessions by user")?;

    Ok(result.rows_affected())
}

async fn delete_expired_sessions_mysql(pool: &MySqlPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired sessions")?;

    Ok(result.rows_affected())
}

fn row_to_session_info_mysql(row: &sqlx::mysql::MySqlRow) -> Result<SessionInfo> {
    Ok(SessionInfo {
        user: User {
            id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        },
        last_activity: row.try_get("last_activity")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use chrono::{Duration, TimeZone};

    async fn setup() -> (Arc<dyn SessionRepository>, i64) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let user = users
            .create(&User::new("alice".to_string(), "hash".to_string()))
            .await
            .expect("Failed to create user");

        (SqlxSessionRepository::boxed(pool), user.id)
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_find_preserves_timestamps() {
        let (repo, user_id) = setup().await;
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap()
            + Duration::milliseconds(123);
        let expires = now + Duration::days(30);

        repo.create("tok", user_id, expires, now)
            .await
            .expect("Failed to create session");

        let info = repo
            .find_valid("tok", now)
            .await
            .expect("Failed to query")
            .expect("Session should be valid");

        assert_eq!(info.user.id, user_id);
        assert_eq!(info.user.username, "alice");
        assert_eq!(info.expires_at, expires);
        assert_eq!(info.last_activity, now);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_exclusive() {
        let (repo, user_id) = setup().await;
        repo.create("tok", user_id, at(12), at(0)).await.unwrap();

        assert!(repo.find_valid("tok", at(11)).await.unwrap().is_some());
        assert!(repo.find_valid("tok", at(12)).await.unwrap().is_none());
        assert!(repo.find_valid("tok", at(13)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_token_is_absent() {
        let (repo, _) = setup().await;
        assert!(repo.find_valid("missing", at(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_is_rejected() {
        let (repo, user_id) = setup().await;
        repo.create("tok", user_id, at(12), at(0)).await.unwrap();
        assert!(repo.create("tok", user_id, at(12), at(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_renew_moves_expiry_and_activity() {
        let (repo, user_id) = setup().await;
        repo.create("tok", user_id, at(12), at(0)).await.unwrap();

        repo.renew("tok", at(23), at(10)).await.unwrap();

        let info = repo.find_valid("tok", at(20)).await.unwrap().unwrap();
        assert_eq!(info.expires_at, at(23));
        assert_eq!(info.last_activity, at(10));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (repo, user_id) = setup().await;
        repo.create("tok", user_id, at(12), at(0)).await.unwrap();

        repo.delete("tok").await.expect("First delete should succeed");
        repo.delete("tok").await.expect("Second delete should succeed");
        repo.delete("never-existed")
            .await
            .expect("Deleting unknown token should succeed");

        assert!(repo.find_valid("tok", at(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_removes_only_expired_rows() {
        let (repo, user_id) = setup().await;
        repo.create("old", user_id, at(5), at(0)).await.unwrap();
        repo.create("edge", user_id, at(10), at(0)).await.unwrap();
        repo.create("live", user_id, at(20), at(0)).await.unwrap();

        let removed = repo.delete_expired(at(10)).await.unwrap();
        assert_eq!(removed, 2);

        assert!(repo.find_valid("live", at(10)).await.unwrap().is_some());
        assert_eq!(repo.delete_expired(at(10)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let (repo, user_id) = setup().await;
        repo.create("a", user_id, at(20), at(0)).await.unwrap();
        repo.create("b", user_id, at(20), at(0)).await.unwrap();

        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 2);
        assert!(repo.find_valid("a", at(1)).await.unwrap().is_none());
    }
}
