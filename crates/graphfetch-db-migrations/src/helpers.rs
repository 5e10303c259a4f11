//! The helper SQL function pair the fetch pipeline relies on.
//!
//! Two families of plpgsql functions are installed once per database and
//! form the stable on-database interface:
//!
//! - `safe_create_fn(sql)` executes arbitrary DDL while trapping
//!   `unique_violation` and `duplicate_function`, making concurrent
//!   `CREATE FUNCTION` attempts idempotent.
//! - `execute_if_exists_n<N>(fn, a1..aN)` invokes a named function with N
//!   integer arguments, trapping `undefined_function` by returning a single
//!   NULL row. The executor uses it as a probe-and-invoke primitive.
//!
//! The shipped SQL must not be edited once deployed; any change requires a
//! new migration.

use graphfetch_core::{FetchError, FetchResult};
use graphfetch_db::executor::DbExecutor;
use graphfetch_db::query::functions::MAX_FN_ARGUMENTS;

/// Renders the `safe_create_fn` helper.
pub fn safe_create_fn_sql() -> String {
    "CREATE OR REPLACE FUNCTION safe_create_fn(sql text) RETURNS void AS $fn$\n\
     BEGIN\n\
     \x20 EXECUTE sql;\n\
     EXCEPTION\n\
     \x20 WHEN unique_violation THEN RETURN;\n\
     \x20 WHEN duplicate_function THEN RETURN;\n\
     END\n\
     $fn$ LANGUAGE plpgsql"
        .to_string()
}

/// Renders the `execute_if_exists_n<N>` helper for one batch size.
///
/// # Errors
///
/// `InvalidArgument` if `n` is zero or exceeds the supported maximum.
pub fn execute_if_exists_sql(n: usize) -> FetchResult<String> {
    if n == 0 || n > MAX_FN_ARGUMENTS {
        return Err(FetchError::InvalidArgument(format!(
            "helper arity must be in 1..={MAX_FN_ARGUMENTS}, got {n}"
        )));
    }
    let args: Vec<String> = (1..=n).map(|i| format!("a{i} int")).collect();
    let placeholders: Vec<String> = (1..=n).map(|i| format!("${i}")).collect();
    let using: Vec<String> = (1..=n).map(|i| format!("a{i}")).collect();
    Ok(format!(
        "CREATE OR REPLACE FUNCTION execute_if_exists_n{n}(fn text, {}) \
         RETURNS SETOF JSON STABLE AS $fn$\n\
         BEGIN\n\
         \x20 RETURN QUERY EXECUTE 'SELECT res FROM ' || fn || '({}) res' USING {};\n\
         EXCEPTION\n\
         \x20 WHEN undefined_function THEN RETURN NEXT NULL;\n\
         END\n\
         $fn$ LANGUAGE plpgsql ROWS {n}",
        args.join(", "),
        placeholders.join(", "),
        using.join(", ")
    ))
}

/// Installs the complete helper pair: `safe_create_fn` plus
/// `execute_if_exists_n1` through `execute_if_exists_n99`.
///
/// Installation is idempotent and intended to run exactly once per database
/// as a schema-migration step.
pub async fn install_helper_functions(db: &dyn DbExecutor) -> FetchResult<()> {
    tracing::info!("installing graphfetch helper functions");
    db.execute_sql(&safe_create_fn_sql(), &[]).await?;
    for n in 1..=MAX_FN_ARGUMENTS {
        db.execute_sql(&execute_if_exists_sql(n)?, &[]).await?;
    }
    Ok(())
}
