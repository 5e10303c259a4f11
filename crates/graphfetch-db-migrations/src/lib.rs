//! # graphfetch-db-migrations
//!
//! Schema-migration pieces for the graphfetch pipeline. Currently this is
//! the one-time installation of the helper SQL function pair described in
//! [`helpers`].

pub mod helpers;

pub use helpers::{execute_if_exists_sql, install_helper_functions, safe_create_fn_sql};
