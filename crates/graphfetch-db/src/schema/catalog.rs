//! The schema catalog: the injected schema-descriptor object.
//!
//! [`SchemaCatalog`] maps entity names and table names to [`EntityMeta`] and
//! carries the relation id-property registry. The registry records, per
//! entity and relation property, the caller-visible name under which that
//! relation's foreign-key value is projected; these names follow no fixed
//! convention and must be declared explicitly via
//! [`with_relation_id`](SchemaCatalog::with_relation_id).
//!
//! The catalog is assembled once at startup and shared read-only across
//! requests. A table-keyed view of the registry is derived lazily on first
//! lookup; [`reset_relation_ids`](SchemaCatalog::reset_relation_ids) is the
//! testing hook that clears both the registry entries and that derived cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use graphfetch_core::{FetchError, FetchResult};

use crate::schema::meta::{EntityDef, EntityMeta, ForeignKeyMeta, RelationMeta};

type DerivedIds = Option<HashMap<String, HashMap<String, String>>>;

// A poisoned lock still holds a consistent map; recover the inner value.
fn read_lock(lock: &RwLock<DerivedIds>) -> std::sync::RwLockReadGuard<'_, DerivedIds> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock(lock: &RwLock<DerivedIds>) -> std::sync::RwLockWriteGuard<'_, DerivedIds> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The schema metadata source for the whole pipeline.
#[derive(Debug)]
pub struct SchemaCatalog {
    /// The database schema all entity tables live in.
    db_schema: String,
    /// Entities keyed by registration name.
    entities: HashMap<String, Arc<EntityMeta>>,
    /// Table name to entity name.
    by_table: HashMap<String, String>,
    /// Raw registry entries: entity name -> relation property -> id property.
    relation_ids: HashMap<String, HashMap<String, String>>,
    /// Table-keyed view of `relation_ids`, derived on first access.
    derived_ids: RwLock<DerivedIds>,
}

impl SchemaCatalog {
    /// Creates an empty catalog for the given database schema.
    pub fn new(db_schema: impl Into<String>) -> Self {
        Self {
            db_schema: db_schema.into(),
            entities: HashMap::new(),
            by_table: HashMap::new(),
            relation_ids: HashMap::new(),
            derived_ids: RwLock::new(None),
        }
    }

    /// Returns the database schema name.
    pub fn db_schema(&self) -> &str {
        &self.db_schema
    }

    /// Registers an entity definition.
    ///
    /// # Errors
    ///
    /// Propagates builder validation errors, and returns `SchemaError` if the
    /// entity name or table name is already registered.
    pub fn register(&mut self, def: EntityDef) -> FetchResult<()> {
        let meta = def.build()?;
        if self.entities.contains_key(&meta.name) {
            return Err(FetchError::SchemaError(format!(
                "entity '{}' is already registered",
                meta.name
            )));
        }
        if self.by_table.contains_key(&meta.table_name) {
            return Err(FetchError::SchemaError(format!(
                "table '{}' is already registered",
                meta.table_name
            )));
        }
        self.by_table
            .insert(meta.table_name.clone(), meta.name.clone());
        self.entities.insert(meta.name.clone(), Arc::new(meta));
        Ok(())
    }

    /// Declares the id-property name for one relation of an entity.
    ///
    /// May be called before or after the entity itself is registered; the
    /// entity is resolved when the mapping is first looked up.
    pub fn with_relation_id(
        &mut self,
        entity: impl Into<String>,
        relation_property: impl Into<String>,
        id_property: impl Into<String>,
    ) {
        self.relation_ids
            .entry(entity.into())
            .or_default()
            .insert(relation_property.into(), id_property.into());
        // Any derived view is now stale.
        *write_lock(&self.derived_ids) = None;
    }

    /// Testing hook: clears the registry entries and the derived cache.
    pub fn reset_relation_ids(&mut self) {
        self.relation_ids.clear();
        *write_lock(&self.derived_ids) = None;
    }

    /// Looks up an entity by registration name.
    pub fn entity(&self, name: &str) -> FetchResult<&Arc<EntityMeta>> {
        self.entities
            .get(name)
            .ok_or_else(|| FetchError::SchemaError(format!("no entity named '{name}'")))
    }

    /// Looks up an entity by table name.
    pub fn entity_by_table(&self, table: &str) -> FetchResult<&Arc<EntityMeta>> {
        let name = self
            .by_table
            .get(table)
            .ok_or_else(|| FetchError::SchemaError(format!("no entity for table '{table}'")))?;
        self.entity(name)
    }

    /// Returns the schema-qualified, quoted path of an entity table.
    pub fn table_path(&self, meta: &EntityMeta) -> String {
        format!("\"{}\".\"{}\"", self.db_schema, meta.table_name)
    }

    /// Returns the schema-qualified, quoted path of an arbitrary table
    /// (used for junction tables).
    pub fn raw_table_path(&self, table: &str) -> String {
        format!("\"{}\".\"{table}\"", self.db_schema)
    }

    /// Returns the id-property name for `(table, relation_property)`.
    ///
    /// The table-keyed view is derived from the registry on first access and
    /// reused until [`with_relation_id`](Self::with_relation_id) or
    /// [`reset_relation_ids`](Self::reset_relation_ids) invalidates it.
    ///
    /// # Errors
    ///
    /// `SchemaError` if the table has no registry entries or the relation
    /// property is unmapped.
    pub fn id_property(&self, table: &str, relation_property: &str) -> FetchResult<String> {
        {
            let guard = read_lock(&self.derived_ids);
            if let Some(derived) = guard.as_ref() {
                return Self::lookup_id_property(derived, table, relation_property);
            }
        }
        let mut derived: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (entity_name, props) in &self.relation_ids {
            let meta = self.entity(entity_name)?;
            derived.insert(meta.table_name.clone(), props.clone());
        }
        let result = Self::lookup_id_property(&derived, table, relation_property);
        *write_lock(&self.derived_ids) = Some(derived);
        result
    }

    fn lookup_id_property(
        derived: &HashMap<String, HashMap<String, String>>,
        table: &str,
        relation_property: &str,
    ) -> FetchResult<String> {
        derived
            .get(table)
            .ok_or_else(|| {
                FetchError::SchemaError(format!(
                    "no relation id-properties registered for table '{table}'"
                ))
            })?
            .get(relation_property)
            .cloned()
            .ok_or_else(|| {
                FetchError::SchemaError(format!(
                    "no id-property registered for '{table}.{relation_property}'"
                ))
            })
    }

    /// Finds the relation on `from` that targets the given table.
    ///
    /// # Errors
    ///
    /// `SchemaError` if no relation between the two entities exists.
    pub fn find_relation<'a>(
        &self,
        from: &'a EntityMeta,
        to_table: &str,
    ) -> FetchResult<&'a RelationMeta> {
        from.relations
            .iter()
            .find(|r| r.target_table == to_table)
            .ok_or_else(|| {
                FetchError::SchemaError(format!(
                    "no relation from '{}' to table '{to_table}'",
                    from.name
                ))
            })
    }

    /// Finds the backlink relation on `child` pointing at `parent`.
    ///
    /// Prefers the inverse-property declared on the parent's relation, then
    /// falls back to matching by target table.
    pub fn find_backlink<'a>(
        &self,
        child: &'a EntityMeta,
        parent: &EntityMeta,
        parent_relation: &RelationMeta,
    ) -> FetchResult<&'a RelationMeta> {
        if let Some(inverse) = &parent_relation.inverse_property {
            if let Some(r) = child
                .relations
                .iter()
                .find(|r| &r.property_name == inverse)
            {
                return Ok(r);
            }
        }
        self.find_relation(child, &parent.table_name)
    }

    /// Finds the single-column FK on `meta`'s table that references `table`.
    ///
    /// # Errors
    ///
    /// `SchemaError` if no FK exists; `UnsupportedComposite` if the FK spans
    /// more than one column.
    pub fn fk_referencing<'a>(
        &self,
        meta: &'a EntityMeta,
        table: &str,
    ) -> FetchResult<&'a ForeignKeyMeta> {
        let fk = meta.foreign_key_to(table).ok_or_else(|| {
            FetchError::SchemaError(format!(
                "table '{}' has no foreign key referencing '{table}'",
                meta.table_name
            ))
        })?;
        fk.single_column()?;
        Ok(fk)
    }
}
