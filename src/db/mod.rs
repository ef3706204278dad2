//! Database layer
//!
//! SQLite is the default backend (one file, created on first run); MySQL is
//! available for hosted deployments. Repositories talk to either one through
//! the `DatabasePool` trait.
//!
//! ```ignore
//! use pennywise::config::DatabaseConfig;
//! use pennywise::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, mysql_pool, sqlite_pool, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};
