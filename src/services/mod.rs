//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They:
//! - Validate and normalise input
//! - Apply the session renewal policy
//! - Build the listing and statistics views

pub mod expense;
pub mod password;
pub mod session;
pub mod statistics;
pub mod user;

pub use expense::{day_title, group_by_day, normalize_category, ExpenseService, ExpenseServiceError};
pub use password::{hash_password, verify_password};
pub use session::{
    generate_token, needs_renewal, spawn_session_sweeper, Authenticated, SessionService,
    SessionServiceError, DEFAULT_SESSION_DURATION_DAYS,
};
pub use statistics::{resolve_period, StatisticsService, StatisticsServiceError};
pub use user::{UserService, UserServiceError};
