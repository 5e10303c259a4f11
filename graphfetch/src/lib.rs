//! # graphfetch
//!
//! An entity graph fetcher for PostgreSQL: given a root entity type, a fetch
//! tree describing which related entities to embed as data, and a list of
//! root ids, it returns one JSON object per existing id -- in a single
//! database round-trip per tree, with the compiled query cached as a
//! server-side stored function.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient
//! access. Depend on `graphfetch` for the whole pipeline, or on individual
//! crates for finer-grained control.

/// Core types: errors, settings, and logging.
pub use graphfetch_core as core;

/// The fetch pipeline: schema catalog, tree builder, SQL compiler,
/// stored-function cache, executor, and hydrator.
pub use graphfetch_db as db;

/// Database backends: PostgreSQL over `tokio-postgres`.
pub use graphfetch_db_backends as db_backends;

/// Helper SQL function installation.
pub use graphfetch_db_migrations as db_migrations;
