//! Relation mutations: linking and unlinking pairs of entities.
//!
//! These are the write-side companions to the fetch pipeline. They resolve
//! the direct relation between two entity types from the catalog, verify
//! that every referenced row exists, and then touch the owning side only: a
//! single FK update for local relations, junction inserts/deletes for
//! many-to-many. Removal batches its statements per table and runs under
//! `REPEATABLE READ` when no transaction is active.

use std::collections::HashMap;

use graphfetch_core::{FetchError, FetchResult};

use crate::executor::DbExecutor;
use crate::schema::catalog::SchemaCatalog;
use crate::schema::meta::RelationKind;
use crate::transactions::{atomic_with_isolation, IsolationLevel};
use crate::value::Value;

/// A reference to one entity row.
#[derive(Debug, Clone)]
pub struct EntityRef {
    /// The entity's registration name.
    pub entity: String,
    /// The row's primary-key value.
    pub id: i64,
}

impl EntityRef {
    /// Creates an entity reference.
    pub fn new(entity: impl Into<String>, id: i64) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

/// One relation edge to remove.
#[derive(Debug, Clone)]
pub struct RelationChange {
    /// The side holding the relation property.
    pub from: EntityRef,
    /// The target side.
    pub to: EntityRef,
}

/// Links two entities through their direct relation.
///
/// The FK is assigned on whichever side owns it; many-to-many relations get
/// a junction row appended.
///
/// # Errors
///
/// `SchemaError` when no direct relation exists, `NotFound` when either row
/// is absent, and `ImplementationError` when the guarded update touches an
/// unexpected number of rows.
pub async fn set_relation(
    db: &dyn DbExecutor,
    catalog: &SchemaCatalog,
    from: &EntityRef,
    to: &EntityRef,
) -> FetchResult<()> {
    let from_meta = catalog.entity(&from.entity)?.clone();
    let to_meta = catalog.entity(&to.entity)?.clone();
    let relation = catalog.find_relation(&from_meta, &to_meta.table_name)?;

    ensure_exists(db, catalog, &from_meta.table_name, &[from.id]).await?;
    ensure_exists(db, catalog, &to_meta.table_name, &[to.id]).await?;

    match relation.kind {
        RelationKind::ManyToOne | RelationKind::OwnerToOne => {
            let jc = relation.join_column()?;
            let sql = format!(
                "UPDATE {} SET \"{}\" = $1 WHERE \"{}\" = $2",
                catalog.table_path(&from_meta),
                jc.column_name,
                from_meta.primary_key_column
            );
            let affected = db
                .execute_sql(&sql, &[Value::Int(to.id), Value::Int(from.id)])
                .await?;
            if affected != 1 {
                return Err(FetchError::ImplementationError(format!(
                    "expected to update exactly one '{}' row, touched {affected}",
                    from_meta.table_name
                )));
            }
        }
        RelationKind::OneToOwner | RelationKind::OneToMany => {
            let fk = catalog.fk_referencing(&to_meta, &from_meta.table_name)?;
            let sql = format!(
                "UPDATE {} SET \"{}\" = $1 WHERE \"{}\" = $2",
                catalog.table_path(&to_meta),
                fk.single_column()?,
                to_meta.primary_key_column
            );
            let affected = db
                .execute_sql(&sql, &[Value::Int(from.id), Value::Int(to.id)])
                .await?;
            if affected != 1 {
                return Err(FetchError::ImplementationError(format!(
                    "expected to update exactly one '{}' row, touched {affected}",
                    to_meta.table_name
                )));
            }
        }
        RelationKind::ManyToMany => {
            let junction = relation.junction()?;
            let sql = format!(
                "INSERT INTO {} (\"{}\", \"{}\") VALUES ($1, $2)",
                catalog.raw_table_path(&junction.table_name),
                junction.own_column,
                junction.remote_column
            );
            db.execute_sql(&sql, &[Value::Int(from.id), Value::Int(to.id)])
                .await?;
        }
    }
    Ok(())
}

/// Unlinks a batch of relation edges.
///
/// All referenced rows are verified first (batched per table); each change
/// is then classified as a local FK nulling or a junction deletion, and the
/// statements are grouped to minimize round-trips. When no transaction is
/// active the whole operation runs under `REPEATABLE READ`.
pub async fn remove_relation(
    db: &dyn DbExecutor,
    catalog: &SchemaCatalog,
    changes: &[RelationChange],
) -> FetchResult<()> {
    if changes.is_empty() {
        return Ok(());
    }
    if db.in_transaction() {
        remove_relation_inner(db, catalog, changes).await
    } else {
        atomic_with_isolation(db, IsolationLevel::RepeatableRead, |txn| async move {
            remove_relation_inner(&*txn, catalog, changes).await
        })
        .await
    }
}

async fn remove_relation_inner(
    db: &dyn DbExecutor,
    catalog: &SchemaCatalog,
    changes: &[RelationChange],
) -> FetchResult<()> {
    // Verify all referenced rows in one query per table.
    let mut by_table: HashMap<String, Vec<i64>> = HashMap::new();
    for change in changes {
        for entity_ref in [&change.from, &change.to] {
            let meta = catalog.entity(&entity_ref.entity)?;
            let ids = by_table.entry(meta.table_name.clone()).or_default();
            if !ids.contains(&entity_ref.id) {
                ids.push(entity_ref.id);
            }
        }
    }
    for (table, ids) in &by_table {
        ensure_exists(db, catalog, table, ids).await?;
    }

    // Classify: local FK columns to null, junction rows to delete.
    let mut local: HashMap<(String, String), Vec<i64>> = HashMap::new();
    let mut junction: HashMap<(String, String, String), Vec<(i64, i64)>> = HashMap::new();
    for change in changes {
        let from_meta = catalog.entity(&change.from.entity)?.clone();
        let to_meta = catalog.entity(&change.to.entity)?.clone();
        let relation = catalog.find_relation(&from_meta, &to_meta.table_name)?;
        match relation.kind {
            RelationKind::ManyToOne | RelationKind::OwnerToOne => {
                let jc = relation.join_column()?;
                local
                    .entry((from_meta.table_name.clone(), jc.column_name.clone()))
                    .or_default()
                    .push(change.from.id);
            }
            RelationKind::OneToOwner | RelationKind::OneToMany => {
                let fk = catalog.fk_referencing(&to_meta, &from_meta.table_name)?;
                local
                    .entry((to_meta.table_name.clone(), fk.single_column()?.to_string()))
                    .or_default()
                    .push(change.to.id);
            }
            RelationKind::ManyToMany => {
                let jm = relation.junction()?;
                junction
                    .entry((
                        jm.table_name.clone(),
                        jm.own_column.clone(),
                        jm.remote_column.clone(),
                    ))
                    .or_default()
                    .push((change.from.id, change.to.id));
            }
        }
    }

    for ((table, column), ids) in &local {
        let meta = catalog.entity_by_table(table)?.clone();
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "UPDATE {} SET \"{column}\" = NULL WHERE \"{}\" IN ({})",
            catalog.table_path(&meta),
            meta.primary_key_column,
            placeholders.join(", ")
        );
        let params: Vec<Value> = ids.iter().map(|id| Value::Int(*id)).collect();
        db.execute_sql(&sql, &params).await?;
    }

    for ((table, own_column, remote_column), pairs) in &junction {
        let mut placeholders: Vec<String> = Vec::with_capacity(pairs.len());
        let mut params: Vec<Value> = Vec::with_capacity(pairs.len() * 2);
        for (index, (own_id, remote_id)) in pairs.iter().enumerate() {
            placeholders.push(format!("(${}, ${})", index * 2 + 1, index * 2 + 2));
            params.push(Value::Int(*own_id));
            params.push(Value::Int(*remote_id));
        }
        let sql = format!(
            "DELETE FROM {} WHERE (\"{own_column}\", \"{remote_column}\") IN ({})",
            catalog.raw_table_path(table),
            placeholders.join(", ")
        );
        db.execute_sql(&sql, &params).await?;
    }

    Ok(())
}

/// Verifies that every id exists in the given table, in one query.
async fn ensure_exists(
    db: &dyn DbExecutor,
    catalog: &SchemaCatalog,
    table: &str,
    ids: &[i64],
) -> FetchResult<()> {
    let meta = catalog.entity_by_table(table)?.clone();
    let pk = &meta.primary_key_column;
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "SELECT \"{pk}\" AS \"{}\" FROM {} WHERE \"{pk}\" IN ({})",
        meta.primary_key_property,
        catalog.table_path(&meta),
        placeholders.join(", ")
    );
    let params: Vec<Value> = ids.iter().map(|id| Value::Int(*id)).collect();
    let rows = db.query(&sql, &params).await?;
    if rows.len() != ids.len() {
        return Err(FetchError::NotFound(format!(
            "table '{table}': expected {} rows for ids {ids:?}, found {}",
            ids.len(),
            rows.len()
        )));
    }
    Ok(())
}
