//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// Server-side session row. The token is the only thing the browser holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session token (cookie value)
    pub token: String,
    /// Owning user
    pub user_id: i64,
    /// Hard expiry; the session is invalid once `now >= expires_at`
    pub expires_at: DateTime<Utc>,
    /// Last creation or renewal time
    pub last_activity: DateTime<Utc>,
}

/// A validated session joined with its user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub user: User,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
