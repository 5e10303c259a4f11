//! Entity metadata: tables, columns, relations, junctions, and foreign keys.
//!
//! [`EntityMeta`] is the read-only view of one entity type that the tree
//! builder, compiler, and hydrator consume. Instances are assembled through
//! the [`EntityDef`] builder and registered with the
//! [`SchemaCatalog`](crate::schema::catalog::SchemaCatalog), which validates
//! the single-primary-key invariant.

use graphfetch_core::{FetchError, FetchResult};

use crate::schema::columns::ColumnType;

/// The five relation kinds.
///
/// A relation is "to-many" iff the last token of its kind is `many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// One-to-one where this side owns the FK column.
    OwnerToOne,
    /// One-to-one where the remote side owns the FK column.
    OneToOwner,
    /// Many-to-one: this side owns the FK column.
    ManyToOne,
    /// One-to-many: the remote side owns the FK column.
    OneToMany,
    /// Many-to-many via a junction table with two FKs.
    ManyToMany,
}

impl RelationKind {
    /// Returns `true` for relations that yield multiple remote rows.
    pub const fn is_to_many(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Returns `true` when this side carries the FK column.
    pub const fn is_local_fk(&self) -> bool {
        matches!(self, Self::OwnerToOne | Self::ManyToOne)
    }

    /// Returns the canonical kind token.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OwnerToOne => "owner-to-one",
            Self::OneToOwner => "one-to-owner",
            Self::ManyToOne => "many-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToMany => "many-to-many",
        }
    }
}

/// An own (non-relation) column of an entity.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    /// The caller-visible property name.
    pub property_name: String,
    /// The database column name.
    pub column_name: String,
    /// The driver type descriptor.
    pub column_type: ColumnType,
    /// Whether this column is the primary key.
    pub primary_key: bool,
}

/// The local FK column of an owning to-one or many-to-one relation.
#[derive(Debug, Clone)]
pub struct JoinColumn {
    /// The database column name of the FK on the owning table.
    pub column_name: String,
    /// The referenced column on the target table (the target's PK).
    pub referenced_column: String,
}

impl JoinColumn {
    /// Creates a join column referencing the target's `id` column.
    pub fn new(column_name: impl Into<String>, referenced_column: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            referenced_column: referenced_column.into(),
        }
    }
}

/// The junction table of a many-to-many relation.
///
/// `own_column` references the entity holding the relation; `remote_column`
/// references the target entity.
#[derive(Debug, Clone)]
pub struct JunctionMeta {
    /// The junction table name (unqualified).
    pub table_name: String,
    /// The junction FK column referencing this entity.
    pub own_column: String,
    /// The junction FK column referencing the target entity.
    pub remote_column: String,
}

impl JunctionMeta {
    /// Creates junction metadata.
    pub fn new(
        table_name: impl Into<String>,
        own_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            own_column: own_column.into(),
            remote_column: remote_column.into(),
        }
    }
}

/// A foreign-key edge from this entity's table to another table.
///
/// Kept alongside relations so backlink FKs can be located from either
/// direction. Composite FKs are representable but rejected at lookup time.
#[derive(Debug, Clone)]
pub struct ForeignKeyMeta {
    /// The FK columns on this entity's table.
    pub columns: Vec<String>,
    /// The referenced table name.
    pub referenced_table: String,
    /// The referenced columns.
    pub referenced_columns: Vec<String>,
}

impl ForeignKeyMeta {
    /// Returns the single FK column, or `UnsupportedComposite` if the FK
    /// spans more than one column.
    pub fn single_column(&self) -> FetchResult<&str> {
        match self.columns.as_slice() {
            [one] => Ok(one),
            _ => Err(FetchError::UnsupportedComposite(format!(
                "composite foreign key to '{}' ({} columns)",
                self.referenced_table,
                self.columns.len()
            ))),
        }
    }
}

/// One directed relation of an entity.
#[derive(Debug, Clone)]
pub struct RelationMeta {
    /// The caller-visible property name of the relation.
    pub property_name: String,
    /// The relation kind.
    pub kind: RelationKind,
    /// The target entity's table name.
    pub target_table: String,
    /// The property name of the inverse relation on the target, if declared.
    pub inverse_property: Option<String>,
    /// Whether this side owns the relation.
    pub owning: bool,
    /// The local FK column for owning to-one / many-to-one relations.
    pub join_column: Option<JoinColumn>,
    /// Junction metadata for many-to-many relations.
    pub junction: Option<JunctionMeta>,
}

impl RelationMeta {
    /// A many-to-one relation: this side owns the FK column.
    pub fn many_to_one(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        inverse_property: Option<&str>,
        join_column: JoinColumn,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::ManyToOne,
            target_table: target_table.into(),
            inverse_property: inverse_property.map(String::from),
            owning: true,
            join_column: Some(join_column),
            junction: None,
        }
    }

    /// A one-to-one relation owned by this side.
    pub fn owner_to_one(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        inverse_property: Option<&str>,
        join_column: JoinColumn,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::OwnerToOne,
            target_table: target_table.into(),
            inverse_property: inverse_property.map(String::from),
            owning: true,
            join_column: Some(join_column),
            junction: None,
        }
    }

    /// A one-to-one relation whose FK lives on the remote side.
    pub fn one_to_owner(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        inverse_property: Option<&str>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::OneToOwner,
            target_table: target_table.into(),
            inverse_property: inverse_property.map(String::from),
            owning: false,
            join_column: None,
            junction: None,
        }
    }

    /// A one-to-many relation: the remote side owns the FK column.
    pub fn one_to_many(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        inverse_property: Option<&str>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::OneToMany,
            target_table: target_table.into(),
            inverse_property: inverse_property.map(String::from),
            owning: false,
            join_column: None,
            junction: None,
        }
    }

    /// A many-to-many relation via a junction table.
    pub fn many_to_many(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        inverse_property: Option<&str>,
        owning: bool,
        junction: JunctionMeta,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::ManyToMany,
            target_table: target_table.into(),
            inverse_property: inverse_property.map(String::from),
            owning,
            join_column: None,
            junction: Some(junction),
        }
    }

    /// Returns the join column, or `SchemaError` if this relation kind does
    /// not carry one.
    pub fn join_column(&self) -> FetchResult<&JoinColumn> {
        self.join_column.as_ref().ok_or_else(|| {
            FetchError::SchemaError(format!(
                "relation '{}' ({}) has no join column",
                self.property_name,
                self.kind.as_str()
            ))
        })
    }

    /// Returns the junction metadata, or `SchemaError` if this is not a
    /// many-to-many relation.
    pub fn junction(&self) -> FetchResult<&JunctionMeta> {
        self.junction.as_ref().ok_or_else(|| {
            FetchError::SchemaError(format!(
                "relation '{}' ({}) has no junction table",
                self.property_name,
                self.kind.as_str()
            ))
        })
    }
}

/// The read-only metadata view of one entity type.
#[derive(Debug)]
pub struct EntityMeta {
    /// The entity's display name (used as the registration key).
    pub name: String,
    /// The unqualified database table name.
    pub table_name: String,
    /// Own (non-relation) columns, including the primary key.
    pub columns: Vec<ColumnMeta>,
    /// The database column name of the single primary key.
    pub primary_key_column: String,
    /// The caller-visible property name of the primary key.
    pub primary_key_property: String,
    /// All declared relations, in declaration order.
    pub relations: Vec<RelationMeta>,
    /// FK edges from this entity's table, for backlink lookup.
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

impl EntityMeta {
    /// Finds the FK on this entity's table that references the given table.
    pub fn foreign_key_to(&self, table: &str) -> Option<&ForeignKeyMeta> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.referenced_table == table)
    }
}

/// Builder for registering an entity with the catalog.
///
/// # Examples
///
/// ```
/// use graphfetch_db::schema::{ColumnType, EntityDef};
///
/// let def = EntityDef::new("author", "author")
///     .primary_key("id", "id", ColumnType::BigInt)
///     .column("name", "name", ColumnType::Text);
/// ```
#[derive(Debug)]
pub struct EntityDef {
    name: String,
    table_name: String,
    columns: Vec<ColumnMeta>,
    relations: Vec<RelationMeta>,
    foreign_keys: Vec<ForeignKeyMeta>,
}

impl EntityDef {
    /// Starts a definition for the given entity name and table.
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Adds the primary-key column.
    #[must_use]
    pub fn primary_key(
        mut self,
        property_name: impl Into<String>,
        column_name: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.columns.push(ColumnMeta {
            property_name: property_name.into(),
            column_name: column_name.into(),
            column_type,
            primary_key: true,
        });
        self
    }

    /// Adds an own (non-relation) column.
    #[must_use]
    pub fn column(
        mut self,
        property_name: impl Into<String>,
        column_name: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.columns.push(ColumnMeta {
            property_name: property_name.into(),
            column_name: column_name.into(),
            column_type,
            primary_key: false,
        });
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationMeta) -> Self {
        // Owning to-one/many-to-one relations imply an FK edge; record it so
        // backlink lookup works from either direction.
        if let Some(jc) = &relation.join_column {
            self.foreign_keys.push(ForeignKeyMeta {
                columns: vec![jc.column_name.clone()],
                referenced_table: relation.target_table.clone(),
                referenced_columns: vec![jc.referenced_column.clone()],
            });
        }
        self.relations.push(relation);
        self
    }

    /// Adds an explicit FK edge (for FKs not implied by a declared relation).
    #[must_use]
    pub fn foreign_key(
        mut self,
        columns: Vec<&str>,
        referenced_table: impl Into<String>,
        referenced_columns: Vec<&str>,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyMeta {
            columns: columns.into_iter().map(String::from).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(String::from).collect(),
        });
        self
    }

    /// Validates the definition and produces the immutable metadata.
    ///
    /// # Errors
    ///
    /// `SchemaError` if no primary key was declared; `UnsupportedComposite`
    /// if more than one column is marked as primary key.
    pub fn build(self) -> FetchResult<EntityMeta> {
        let pk_columns: Vec<&ColumnMeta> =
            self.columns.iter().filter(|c| c.primary_key).collect();
        let pk = match pk_columns.as_slice() {
            [] => {
                return Err(FetchError::SchemaError(format!(
                    "entity '{}' has no primary key column",
                    self.name
                )))
            }
            [one] => (*one).clone(),
            _ => {
                return Err(FetchError::UnsupportedComposite(format!(
                    "entity '{}' declares {} primary key columns",
                    self.name,
                    pk_columns.len()
                )))
            }
        };
        Ok(EntityMeta {
            name: self.name,
            table_name: self.table_name,
            columns: self.columns,
            primary_key_column: pk.column_name,
            primary_key_property: pk.property_name,
            relations: self.relations,
            foreign_keys: self.foreign_keys,
        })
    }
}
