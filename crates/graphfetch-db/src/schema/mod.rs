//! Schema metadata: column types, entity metadata, and the catalog.
//!
//! - [`columns`] - PostgreSQL column type descriptors and the hydration hook
//! - [`meta`] - entity, relation, junction, and foreign-key metadata
//! - [`catalog`] - the injected schema-descriptor object and id-property registry

pub mod catalog;
pub mod columns;
pub mod meta;

pub use catalog::SchemaCatalog;
pub use columns::ColumnType;
pub use meta::{
    ColumnMeta, EntityDef, EntityMeta, ForeignKeyMeta, JoinColumn, JunctionMeta, RelationKind,
    RelationMeta,
};
