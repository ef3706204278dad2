//! Database repositories
//!
//! One repository per table. Each exposes an async trait used by the
//! services and a SQLx implementation covering SQLite and MySQL.

pub mod expense;
pub mod session;
pub mod user;

pub use expense::{ExpenseRepository, SqlxExpenseRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
