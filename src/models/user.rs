//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. Users are created by bootstrap or the `adduser`
/// tool and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique, case-sensitive)
    pub username: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. The id is assigned by the database.
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: 0,
            username,
            password_hash,
            created_at: Utc::now(),
        }
    }
}
