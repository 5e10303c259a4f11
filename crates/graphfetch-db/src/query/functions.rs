//! Stored-function naming, DDL, and invocation SQL.
//!
//! Each compiled query is materialized on the database side as a plpgsql
//! function keyed by tree shape and batch size, so repeated identical shapes
//! skip parsing and planning. This module derives the function names,
//! renders the `CREATE FUNCTION` DDL, and builds the probe / direct-call /
//! inline-fallback statements the executor issues.

use graphfetch_core::{FetchError, FetchResult};

/// Bumpable version tag baked into every generated function name. Bumping it
/// retires all previously created functions (they stay in the catalog,
/// unused, until dropped by ops).
pub const FN_VERSION: &str = "1";

/// The maximum number of ids per stored-function invocation, matching the
/// highest installed `execute_if_exists_n<N>` helper.
pub const MAX_FN_ARGUMENTS: usize = 99;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const PG_IDENTIFIER_LIMIT: usize = 63;

/// The textual placeholder the compiler leaves for the root id list.
pub const IDS_PLACEHOLDER: &str = ":...ids";

/// Derives the stored-function name for `(tree shape, batch size)`.
///
/// The name is `builder_<VERSION>_<first 15 chars of root table>_<hash>_n<B>`.
/// In development an over-long name is a hard `DatabaseError`; in production
/// it is byte-truncated to the identifier limit.
///
/// # Errors
///
/// `InvalidArgument` if `batch_size` is zero or exceeds
/// [`MAX_FN_ARGUMENTS`]; `DatabaseError` for over-long names in development.
pub fn function_name(
    root_table: &str,
    tree_hash: &str,
    batch_size: usize,
    debug: bool,
) -> FetchResult<String> {
    if batch_size == 0 || batch_size > MAX_FN_ARGUMENTS {
        return Err(FetchError::InvalidArgument(format!(
            "batch size must be in 1..={MAX_FN_ARGUMENTS}, got {batch_size}"
        )));
    }
    let prefix: String = root_table.chars().take(15).collect();
    let name = format!("builder_{FN_VERSION}_{prefix}_{tree_hash}_n{batch_size}");
    if name.len() > PG_IDENTIFIER_LIMIT {
        if debug {
            return Err(FetchError::DatabaseError(format!(
                "generated function name '{name}' exceeds the {PG_IDENTIFIER_LIMIT}-byte \
                 PostgreSQL identifier limit"
            )));
        }
        return Ok(name[..PG_IDENTIFIER_LIMIT].to_string());
    }
    Ok(name)
}

/// Renders the `CREATE FUNCTION` DDL wrapping a compiled query.
///
/// The id placeholder is substituted with `$1..$B`, and each root row is
/// wrapped by `row_to_json` so every invocation path returns one JSON value
/// per row. `STABLE` and the declared `ROWS` estimate let the planner cost
/// call sites accurately.
pub fn create_function_sql(name: &str, compiled_sql: &str, batch_size: usize) -> String {
    let args = vec!["int"; batch_size].join(", ");
    let placeholders: Vec<String> = (1..=batch_size).map(|i| format!("${i}")).collect();
    let body = compiled_sql.replace(IDS_PLACEHOLDER, &placeholders.join(", "));
    format!(
        "CREATE FUNCTION {name}({args}) RETURNS SETOF JSON STABLE AS $$\n\
         BEGIN\n\
         \x20 RETURN QUERY SELECT row_to_json(rows) AS res FROM ({body}) rows;\n\
         END\n\
         $$ LANGUAGE plpgsql ROWS {batch_size}"
    )
}

/// Builds the probe-and-invoke statement: `$1` is the function name, `$2..`
/// are the batch ids. A single NULL row in the result means the function
/// does not exist yet.
pub fn probe_call_sql(batch_size: usize) -> String {
    let placeholders: Vec<String> = (2..=batch_size + 1).map(|i| format!("${i}")).collect();
    format!(
        "SELECT res FROM execute_if_exists_n{batch_size}($1, {}) res",
        placeholders.join(", ")
    )
}

/// Builds the direct invocation of a known-existing stored function.
pub fn direct_call_sql(name: &str, batch_size: usize) -> String {
    let placeholders: Vec<String> = (1..=batch_size).map(|i| format!("${i}")).collect();
    format!("SELECT res FROM {name}({}) res", placeholders.join(", "))
}

/// Builds the raw fallback used when a transaction is active: the compiled
/// query with ids inlined, wrapped the same way the stored function wraps
/// its rows. Inlining is safe because ids are parsed to integers before any
/// SQL is built.
pub fn inline_fallback_sql(compiled_sql: &str, ids: &[i64]) -> String {
    let id_list: Vec<String> = ids.iter().map(i64::to_string).collect();
    let body = compiled_sql.replace(IDS_PLACEHOLDER, &id_list.join(", "));
    format!("SELECT row_to_json(rows) AS res FROM ({body}) rows")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_name_shape() {
        let name = function_name("author", "123456", 3, true).unwrap();
        assert_eq!(name, "builder_1_author_123456_n3");
    }

    #[test]
    fn test_function_name_truncates_long_tables() {
        let name = function_name("a_very_long_table_name_indeed", "42", 1, true).unwrap();
        assert!(name.starts_with("builder_1_a_very_long_tab_"));
    }

    #[test]
    fn test_function_name_rejects_bad_batch() {
        assert!(function_name("t", "1", 0, true).is_err());
        assert!(function_name("t", "1", 100, true).is_err());
    }

    #[test]
    fn test_over_long_name_fails_in_dev() {
        let hash = "9".repeat(60);
        let err = function_name("authors", &hash, 99, true).unwrap_err();
        assert!(err.to_string().contains("identifier limit"));
    }

    #[test]
    fn test_over_long_name_truncated_in_prod() {
        let hash = "9".repeat(60);
        let name = function_name("authors", &hash, 99, false).unwrap();
        assert_eq!(name.len(), PG_IDENTIFIER_LIMIT);
    }

    #[test]
    fn test_create_function_sql() {
        let sql = create_function_sql(
            "builder_1_t_7_n2",
            "SELECT \"rel_1\".\"id\" AS \"id\" FROM \"main\".\"t\" \"rel_1\" \
             WHERE \"rel_1\".\"id\" IN (:...ids)",
            2,
        );
        assert!(sql.starts_with("CREATE FUNCTION builder_1_t_7_n2(int, int) RETURNS SETOF JSON STABLE"));
        assert!(sql.contains("IN ($1, $2)"));
        assert!(!sql.contains(IDS_PLACEHOLDER));
        assert!(sql.contains("row_to_json(rows) AS res"));
        assert!(sql.ends_with("LANGUAGE plpgsql ROWS 2"));
    }

    #[test]
    fn test_probe_call_sql() {
        assert_eq!(
            probe_call_sql(3),
            "SELECT res FROM execute_if_exists_n3($1, $2, $3, $4) res"
        );
    }

    #[test]
    fn test_direct_call_sql() {
        assert_eq!(
            direct_call_sql("builder_1_t_7_n2", 2),
            "SELECT res FROM builder_1_t_7_n2($1, $2) res"
        );
    }

    #[test]
    fn test_inline_fallback_sql() {
        let sql = inline_fallback_sql("SELECT 1 FROM t WHERE id IN (:...ids)", &[3, 1, 2]);
        assert_eq!(
            sql,
            "SELECT row_to_json(rows) AS res FROM (SELECT 1 FROM t WHERE id IN (3, 1, 2)) rows"
        );
    }
}
