//! Core error types for the graphfetch pipeline.
//!
//! This module provides the [`FetchError`] enum covering every failure class
//! the fetch pipeline can surface: argument validation, schema metadata
//! problems, composite-key limitations, missing rows, database failures, and
//! internal invariant violations.

use thiserror::Error;

/// The primary error type for the graphfetch crates.
///
/// The pipeline does not catch or retry; every variant propagates to the
/// caller unchanged. Fallback branches inside the stored-function probe are
/// expected control flow, not errors.
#[derive(Error, Debug)]
pub enum FetchError {
    /// A caller-supplied argument is malformed: an empty or non-numeric id,
    /// a malformed fetch tree, or a batch size of zero.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema metadata is missing or inconsistent: unknown entity, missing
    /// relation, missing foreign key, or an unmapped relation id-property.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// A composite primary or foreign key was encountered. The pipeline only
    /// supports single-column keys.
    #[error("Unsupported composite key: {0}")]
    UnsupportedComposite(String),

    /// A relation mutation referenced a row that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An error bubbled up from the database driver, including an over-long
    /// generated function name in development mode.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A connection-level failure (pool exhaustion, connect failure).
    #[error("Operational error: {0}")]
    OperationalError(String),

    /// An internal invariant was violated; indicates a bug in this crate.
    #[error("Implementation error: {0}")]
    ImplementationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A convenience type alias for `Result<T, FetchError>`.
pub type FetchResult<T> = Result<T, FetchError>;
