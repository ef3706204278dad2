//! Session lifecycle and rolling renewal
//!
//! Sessions last `duration` (30 days by default). An active user never gets
//! logged out: once less than half the lifetime remains, the next
//! authenticated request pushes the expiry back to `now + duration`. Renewal
//! therefore happens at most once per half-lifetime and never shortens a
//! session.

use std::sync::Arc;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::db::repositories::SessionRepository;
use crate::models::{Session, SessionInfo, User};

/// Default session lifetime in days
pub const DEFAULT_SESSION_DURATION_DAYS: i64 = 30;

/// Random bytes per session token
const TOKEN_BYTES: usize = 32;

/// Session service errors
#[derive(Debug, Error)]
pub enum SessionServiceError {
    /// Token missing, unknown or expired
    #[error("Session not found")]
    SessionNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of authenticating a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    pub user: User,
    /// New expiry when this request renewed the session
    pub renewed_until: Option<DateTime<Utc>>,
}

/// Whether a session expiring at `expires_at` should be renewed at `now`.
///
/// True once strictly less than half of `duration` remains.
pub fn needs_renewal(expires_at: DateTime<Utc>, now: DateTime<Utc>, duration: Duration) -> bool {
    expires_at - now < duration / 2
}

/// Generate an unguessable, URL-safe session token from the OS RNG.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| anyhow::anyhow!("Failed to read secure random bytes: {}", e))?;
    Ok(BASE64URL_NOPAD.encode(&bytes))
}

/// Session service
pub struct SessionService {
    session_repo: Arc<dyn SessionRepository>,
    duration: Duration,
}

impl SessionService {
    /// Create a session service with the default 30-day lifetime
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_duration(session_repo, Duration::days(DEFAULT_SESSION_DURATION_DAYS))
    }

    /// Create a session service with a custom lifetime
    pub fn with_duration(session_repo: Arc<dyn SessionRepository>, duration: Duration) -> Self {
        Self {
            session_repo,
            duration,
        }
    }

    /// Configured session lifetime
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start a new session for `user_id`.
    pub async fn create_session(&self, user_id: i64) -> Result<Session, SessionServiceError> {
        self.create_session_at(user_id, Utc::now()).await
    }

    pub async fn create_session_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionServiceError> {
        let token = generate_token()?;
        let session = self
            .session_repo
            .create(&token, user_id, now + self.duration, now)
            .await?;
        Ok(session)
    }

    /// Resolve a token to its user.
    pub async fn validate_session(&self, token: &str) -> Result<User, SessionServiceError> {
        Ok(self.validate_session_with_info(token).await?.user)
    }

    /// Resolve a token to its user plus session timestamps.
    pub async fn validate_session_with_info(
        &self,
        token: &str,
    ) -> Result<SessionInfo, SessionServiceError> {
        self.validate_session_with_info_at(token, Utc::now()).await
    }

    pub async fn validate_session_with_info_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionInfo, SessionServiceError> {
        if token.is_empty() {
            return Err(SessionServiceError::SessionNotFound);
        }
        self.session_repo
            .find_valid(token, now)
            .await?
            .ok_or(SessionServiceError::SessionNotFound)
    }

    /// Set a new expiry and mark the session active now.
    pub async fn renew_session(
        &self,
        token: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), SessionServiceError> {
        self.session_repo
            .renew(token, new_expires_at, Utc::now())
            .await?;
        Ok(())
    }

    /// Log out. Unknown tokens are fine.
    pub async fn delete_session(&self, token: &str) -> Result<(), SessionServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// Remove every session that has expired.
    pub async fn clean_expired_sessions(&self) -> Result<u64, SessionServiceError> {
        Ok(self.session_repo.delete_expired(Utc::now()).await?)
    }

    /// Validate a request's token and apply the rolling renewal policy.
    ///
    /// A failed renewal is logged and the request still authenticates with
    /// the old expiry.
    pub async fn authenticate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, SessionServiceError> {
        let info = self.validate_session_with_info_at(token, now).await?;

        if !needs_renewal(info.expires_at, now, self.duration) {
            return Ok(Authenticated {
                user: info.user,
                renewed_until: None,
            });
        }

        let new_expires_at = now + self.duration;
        match self.session_repo.renew(token, new_expires_at, now).await {
            Ok(()) => {
                tracing::debug!(
                    "Renewed session for user {} until {}",
                    info.user.id,
                    new_expires_at
                );
                Ok(Authenticated {
                    user: info.user,
                    renewed_until: Some(new_expires_at),
                })
            }
            Err(e) => {
                tracing::warn!("Failed to renew session for user {}: {:#}", info.user.id, e);
                Ok(Authenticated {
                    user: info.user,
                    renewed_until: None,
                })
            }
        }
    }
}

/// Periodically delete expired sessions until the runtime shuts down.
pub fn spawn_session_sweeper(
    service: Arc<SessionService>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match service.clean_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Removed {} expired session(s)", removed),
                Err(e) => tracing::error!("Failed to clean expired sessions: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations::run_migrations};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{SubsecRound, TimeZone};
    use proptest::prelude::*;

    async fn setup_service() -> (SessionService, Arc<dyn SessionRepository>, User) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user = SqlxUserRepository::boxed(pool.clone())
            .create(&User::new("alice".to_string(), "hash".to_string()))
            .await
            .expect("Failed to create user");
        let repo = SqlxSessionRepository::boxed(pool);

        (SessionService::new(repo.clone()), repo, user)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generated_tokens_are_unique_and_url_safe() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_renewal_threshold_with_default_duration() {
        let duration = Duration::days(30);
        let created = t0();
        let expires = created + duration;

        assert!(!needs_renewal(expires, created + Duration::days(14), duration));
        assert!(!needs_renewal(expires, created + Duration::days(15), duration));
        assert!(needs_renewal(expires, created + Duration::days(16), duration));
    }

    #[tokio::test]
    async fn test_create_then_validate_with_info() {
        let (service, _, user) = setup_service().await;
        let now = Utc::now().trunc_subsecs(3);
        let session = service.create_session_at(user.id, now).await.unwrap();

        assert_eq!(session.expires_at, now + Duration::days(30));

        let info = service
            .validate_session_with_info_at(&session.token, now)
            .await
            .expect("Session should validate");
        assert_eq!(info.user.id, user.id);
        assert_eq!(info.expires_at, session.expires_at);
        assert_eq!(info.last_activity, now);

        let validated = service.validate_session(&session.token).await.unwrap();
        assert_eq!(validated.username, "alice");
    }

    #[tokio::test]
    async fn test_unknown_and_empty_tokens_are_not_found() {
        let (service, _, _) = setup_service().await;

        assert!(matches!(
            service.validate_session("nope").await,
            Err(SessionServiceError::SessionNotFound)
        ));
        assert!(matches!(
            service.validate_session("").await,
            Err(SessionServiceError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_does_not_renew_fresh_session() {
        let (service, _, user) = setup_service().await;
        let session = service.create_session_at(user.id, t0()).await.unwrap();

        let auth = service
            .authenticate(&session.token, t0() + Duration::days(14))
            .await
            .unwrap();
        assert_eq!(auth.user.id, user.id);
        assert_eq!(auth.renewed_until, None);

        let info = service
            .validate_session_with_info_at(&session.token, t0() + Duration::days(14))
            .await
            .unwrap();
        assert_eq!(info.expires_at, session.expires_at);
    }

    #[tokio::test]
    async fn test_authenticate_renews_past_half_life() {
        let (service, _, user) = setup_service().await;
        let session = service.create_session_at(user.id, t0()).await.unwrap();
        let now = t0() + Duration::days(16);

        let auth = service.authenticate(&session.token, now).await.unwrap();
        assert_eq!(auth.renewed_until, Some(now + Duration::days(30)));

        let info = service
            .validate_session_with_info_at(&session.token, now)
            .await
            .unwrap();
        assert_eq!(info.expires_at, now + Duration::days(30));
        assert_eq!(info.last_activity, now);
        assert!(info.expires_at > session.expires_at);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_expired_session() {
        let (service, _, user) = setup_service().await;
        let session = service.create_session_at(user.id, t0()).await.unwrap();

        let result = service
            .authenticate(&session.token, session.expires_at)
            .await;
        assert!(matches!(result, Err(SessionServiceError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_delete_session_is_idempotent() {
        let (service, _, user) = setup_service().await;
        let session = service.create_session(user.id).await.unwrap();

        service.delete_session(&session.token).await.unwrap();
        service.delete_session(&session.token).await.unwrap();
        service.delete_session("unknown").await.unwrap();

        assert!(service.validate_session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_clean_expired_sessions() {
        let (service, _, user) = setup_service().await;
        let long_ago = Utc::now() - Duration::days(60);
        service.create_session_at(user.id, long_ago).await.unwrap();
        let live = service.create_session(user.id).await.unwrap();

        assert_eq!(service.clean_expired_sessions().await.unwrap(), 1);
        assert!(service.validate_session(&live.token).await.is_ok());
    }

    /// Delegates reads but fails every renewal.
    struct FailingRenewRepo(Arc<dyn SessionRepository>);

    #[async_trait]
    impl SessionRepository for FailingRenewRepo {
        async fn create(
            &self,
            token: &str,
            user_id: i64,
            expires_at: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> Result<Session> {
            self.0.create(token, user_id, expires_at, now).await
        }
        async fn find_valid(&self, token: &str, now: DateTime<Utc>) -> Result<Option<SessionInfo>> {
            self.0.find_valid(token, now).await
        }
        async fn renew(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
        async fn delete(&self, token: &str) -> Result<()> {
            self.0.delete(token).await
        }
        async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
            self.0.delete_by_user(user_id).await
        }
        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
            self.0.delete_expired(now).await
        }
    }

    #[tokio::test]
    async fn test_failed_renewal_still_authenticates() {
        let (_, repo, user) = setup_service().await;
        let service = SessionService::new(Arc::new(FailingRenewRepo(repo)));
        let session = service.create_session_at(user.id, t0()).await.unwrap();

        let auth = service
            .authenticate(&session.token, t0() + Duration::days(20))
            .await
            .expect("Renewal failure must not fail the request");
        assert_eq!(auth.user.id, user.id);
        assert_eq!(auth.renewed_until, None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_renewal_fires_below_half_and_never_shortens(
            duration_secs in 60i64..90 * 86_400,
            elapsed_fraction in 0.0f64..1.0,
        ) {
            let duration = Duration::seconds(duration_secs);
            let created = t0();
            let expires = created + duration;
            let elapsed = Duration::seconds((duration_secs as f64 * elapsed_fraction) as i64);
            let now = created + elapsed;

            let renew = needs_renewal(expires, now, duration);
            prop_assert_eq!(renew, expires - now < duration / 2);

            if renew {
                prop_assert!(now + duration > expires);
            }
        }
    }
}
