//! Database layer
//!
//! Reports and WeChat articles live in a relational store. SQLite is the
//! default (single file next to the binary); MySQL is supported for shared
//! deployments. The driver is selected from `database.driver`.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, redact_url, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
