//! Query building, compilation, and stored-function plumbing.
//!
//! This module contains the read-path pipeline:
//!
//! - [`tree`] - fetch trees and the normalized query tree
//! - [`compiler`] - one-statement SQL compilation with lateral joins
//! - [`hash`] - stable tree fingerprinting for the function cache
//! - [`functions`] - stored-function naming, DDL, and invocation SQL

pub mod compiler;
pub mod functions;
pub mod hash;
pub mod tree;

pub use compiler::SqlCompiler;
pub use functions::{FN_VERSION, IDS_PLACEHOLDER, MAX_FN_ARGUMENTS, PG_IDENTIFIER_LIMIT};
pub use hash::tree_hash;
pub use tree::{build_query_tree, AliasGenerator, FetchTree, NodeBody, QueryNode};
