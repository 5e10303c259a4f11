//! # graphfetch-db-backends
//!
//! Database backends for the graphfetch pipeline. PostgreSQL is the only
//! supported dialect; the backend implements the
//! [`DbExecutor`](graphfetch_db::executor::DbExecutor) trait over a pooled
//! `tokio-postgres` connection.

pub mod base;
pub mod postgresql;

pub use base::DatabaseConfig;
pub use postgresql::PostgresBackend;
