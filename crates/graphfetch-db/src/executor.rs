//! The database executor trait and the batching fetch pipeline.
//!
//! [`DbExecutor`] is the minimal async interface the pipeline needs from a
//! backend; the PostgreSQL implementation lives in the backends crate.
//! [`EntityFetcher`] drives the whole read path: validate and dedupe ids,
//! build and compile the query tree once, then execute per batch through the
//! stored-function probe, hydrate the returned JSON rows, and restore the
//! caller's id order.

use std::collections::{HashMap, HashSet};

use graphfetch_core::{FetchError, FetchResult, Settings};
use serde_json::Value as Json;
use tracing::Instrument;

use crate::hydrate::Hydrator;
use crate::query::compiler::SqlCompiler;
use crate::query::functions::{
    create_function_sql, direct_call_sql, function_name, inline_fallback_sql, probe_call_sql,
    MAX_FN_ARGUMENTS,
};
use crate::query::hash::tree_hash;
use crate::query::tree::{build_query_tree, FetchTree, QueryNode};
use crate::schema::catalog::SchemaCatalog;
use crate::transactions::atomic;
use crate::value::{Row, Value};

/// Minimal async database executor trait.
///
/// Implemented by the PostgreSQL backend and by
/// [`TransactionManager`](crate::transactions::TransactionManager), which
/// wraps another executor and reports `in_transaction() == true` while a
/// transaction is open.
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// Runs a SQL statement that does not return rows.
    /// Returns the number of rows affected.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> FetchResult<u64>;

    /// Runs a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> FetchResult<Vec<Row>>;

    /// Runs a SQL query and returns exactly one row.
    async fn query_one(&self, sql: &str, params: &[Value]) -> FetchResult<Row>;

    /// Whether a transaction is currently active on this executor. While
    /// true, the pipeline never issues `CREATE FUNCTION` (DDL inside a user
    /// transaction can deadlock with concurrent creators).
    fn in_transaction(&self) -> bool {
        false
    }
}

/// Observability hook invoked once per issued batch.
pub type OnRequest<'a> = &'a (dyn Fn() + Send + Sync);

/// The entity graph fetcher.
///
/// One instance is cheap and stateless; it borrows the process-wide schema
/// catalog and settings.
pub struct EntityFetcher<'a> {
    catalog: &'a SchemaCatalog,
    settings: &'a Settings,
}

impl<'a> EntityFetcher<'a> {
    /// Creates a fetcher over the given catalog and settings.
    pub const fn new(catalog: &'a SchemaCatalog, settings: &'a Settings) -> Self {
        Self { catalog, settings }
    }

    /// Fetches one JSON object per existing id, with nested relations
    /// embedded per the fetch tree.
    ///
    /// Results are ordered by the first occurrence of each id in `ids`;
    /// duplicates are collapsed and non-existent ids simply produce no row.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unparsable ids (and, in development, empty
    /// ids); schema and database errors propagate unchanged.
    pub async fn fetch(
        &self,
        db: &dyn DbExecutor,
        tree: &FetchTree,
        ids: &[String],
        on_request: Option<OnRequest<'_>>,
    ) -> FetchResult<Vec<Json>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if self.settings.debug {
            if let Some(bad) = ids.iter().find(|id| id.is_empty()) {
                return Err(FetchError::InvalidArgument(format!(
                    "empty id in fetch request: {bad:?}"
                )));
            }
        }

        // Parse up front: the raw-fallback path inlines these values, which
        // is only safe for integers.
        let mut unique_ids: Vec<i64> = Vec::with_capacity(ids.len());
        let mut seen: HashSet<i64> = HashSet::with_capacity(ids.len());
        for id in ids {
            let parsed: i64 = id.trim().parse().map_err(|_| {
                FetchError::InvalidArgument(format!("id '{id}' is not a valid integer"))
            })?;
            if seen.insert(parsed) {
                unique_ids.push(parsed);
            }
        }

        let root = build_query_tree(self.catalog, tree)?;
        let compiled = SqlCompiler::new(self.catalog).compile(&root)?;
        let hash = tree_hash(&root);

        let span = tracing::debug_span!(
            "fetch",
            table = %root.body().meta.table_name,
            tree = %hash,
            ids = unique_ids.len()
        );
        let (root_ref, compiled_ref, hash_ref, ids_ref) =
            (&root, compiled.as_str(), hash.as_str(), unique_ids.as_slice());
        let mut rows = if unique_ids.len() > MAX_FN_ARGUMENTS && !db.in_transaction() {
            // Multi-batch fetches get their own transaction so the fallback
            // path stays serialized against concurrent function creation.
            atomic(db, |txn| async move {
                self.run_batches(&*txn, root_ref, compiled_ref, hash_ref, ids_ref, on_request)
                    .await
            })
            .instrument(span)
            .await?
        } else {
            self.run_batches(db, root_ref, compiled_ref, hash_ref, ids_ref, on_request)
                .instrument(span)
                .await?
        };

        Hydrator::new(self.catalog).hydrate_rows(&root, &mut rows)?;

        // Restore the caller's order. `unique_ids` preserves first-seen
        // order, so its index is the sort key.
        let pk_prop = &root.body().meta.primary_key_property;
        let positions: HashMap<i64, usize> = unique_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();
        rows.sort_by_key(|row| {
            row.get(pk_prop)
                .and_then(Json::as_i64)
                .and_then(|id| positions.get(&id).copied())
                .unwrap_or(usize::MAX)
        });
        Ok(rows)
    }

    /// Executes all batches sequentially and concatenates the unwrapped
    /// JSON rows.
    async fn run_batches(
        &self,
        db: &dyn DbExecutor,
        root: &QueryNode,
        compiled: &str,
        hash: &str,
        ids: &[i64],
        on_request: Option<OnRequest<'_>>,
    ) -> FetchResult<Vec<Json>> {
        let root_table = &root.body().meta.table_name;
        let mut rows: Vec<Json> = Vec::new();
        for batch in ids.chunks(MAX_FN_ARGUMENTS) {
            if let Some(hook) = on_request {
                hook();
            }
            rows.extend(self.run_batch(db, root_table, compiled, hash, batch).await?);
        }
        Ok(rows)
    }

    /// Executes one batch through the probe-create-invoke protocol.
    async fn run_batch(
        &self,
        db: &dyn DbExecutor,
        root_table: &str,
        compiled: &str,
        hash: &str,
        batch: &[i64],
    ) -> FetchResult<Vec<Json>> {
        let fn_name = function_name(root_table, hash, batch.len(), self.settings.debug)?;

        let mut params: Vec<Value> = Vec::with_capacity(batch.len() + 1);
        params.push(Value::String(fn_name.clone()));
        params.extend(batch.iter().map(|id| Value::Int(*id)));
        let probe_rows = db.query(&probe_call_sql(batch.len()), &params).await?;

        let function_missing =
            probe_rows.len() == 1 && probe_rows[0].get_value("res").map_or(true, Value::is_null);

        let rows = if function_missing {
            if db.in_transaction() {
                // Creating the function here could deadlock with concurrent
                // creators; run the raw query instead.
                tracing::debug!(function = %fn_name, "function missing inside transaction, using raw fallback");
                db.query(&inline_fallback_sql(compiled, batch), &[]).await?
            } else {
                tracing::debug!(function = %fn_name, "creating stored function");
                let ddl = create_function_sql(&fn_name, compiled, batch.len());
                db.execute_sql("SELECT safe_create_fn($1)", &[Value::String(ddl)])
                    .await?;
                let id_params: Vec<Value> = batch.iter().map(|id| Value::Int(*id)).collect();
                db.query(&direct_call_sql(&fn_name, batch.len()), &id_params)
                    .await?
            }
        } else {
            probe_rows
        };

        rows.into_iter()
            .map(|row| match row.get_value("res") {
                Some(Value::Json(json)) => Ok(json.clone()),
                other => Err(FetchError::DatabaseError(format!(
                    "expected a JSON 'res' column, got {other:?}"
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // DbExecutor must stay object-safe: the whole pipeline passes it as
    // `&dyn DbExecutor`.
    fn _assert_object_safe(_: &dyn DbExecutor) {}

    #[test]
    fn test_on_request_type_accepts_closures() {
        let count = std::sync::atomic::AtomicUsize::new(0);
        let hook = || {
            count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        };
        let on_request: OnRequest<'_> = &hook;
        on_request();
        assert_eq!(count.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
