//! Post-processing of returned JSON rows.
//!
//! The database returns rows that are almost the caller's expected shape.
//! The hydrator walks each row pre-order alongside the query tree and
//! applies three fixups per node: own-column values pass through the driver
//! hydration hook, id children are normalized (absent to-one relations are
//! deleted rather than left null, to-many id arrays are compacted and
//! sorted), and data children are recursed into with to-many arrays sorted
//! by the child primary key. Many-to-many grouping helper columns are
//! stripped along the way.

use graphfetch_core::FetchResult;
use serde_json::{Map, Value as Json};

use crate::query::compiler::junction_helper_key;
use crate::query::tree::{NodeBody, QueryNode};
use crate::schema::catalog::SchemaCatalog;
use crate::schema::meta::{RelationKind, RelationMeta};

/// Walks returned JSON trees and applies the per-node fixups.
pub struct Hydrator<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> Hydrator<'a> {
    /// Creates a hydrator over the given catalog.
    pub const fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    /// Hydrates every row in place.
    pub fn hydrate_rows(&self, root: &QueryNode, rows: &mut [Json]) -> FetchResult<()> {
        let body = root.body();
        for row in rows {
            if let Some(entity) = row.as_object_mut() {
                self.hydrate_entity(body, entity)?;
            }
        }
        Ok(())
    }

    fn hydrate_entity(&self, node: &NodeBody, entity: &mut Map<String, Json>) -> FetchResult<()> {
        // Own columns through the driver hook, property by property.
        for column in &node.meta.columns {
            if let Some(value) = entity.remove(&column.property_name) {
                entity.insert(
                    column.property_name.clone(),
                    column.column_type.hydrate(value)?,
                );
            }
        }

        for (relation, child) in node.meta.relations.iter().zip(&node.children) {
            match child {
                QueryNode::Ids(_) => self.hydrate_ids_child(node, relation, entity)?,
                QueryNode::Data(child_body) => {
                    self.hydrate_data_child(relation, child_body, entity)?;
                }
            }
        }
        Ok(())
    }

    fn hydrate_ids_child(
        &self,
        node: &NodeBody,
        relation: &RelationMeta,
        entity: &mut Map<String, Json>,
    ) -> FetchResult<()> {
        let id_prop = self
            .catalog
            .id_property(&node.meta.table_name, &relation.property_name)?;
        if relation.kind.is_to_many() {
            let raw = entity.remove(&id_prop).unwrap_or(Json::Null);
            let mut ids: Vec<Json> = raw
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|v| !v.is_null())
                .collect();
            ids.sort_by_key(|v| v.as_i64().unwrap_or(i64::MAX));
            entity.insert(id_prop, Json::Array(ids));
        } else if entity.get(&id_prop).map_or(false, Json::is_null) {
            // Null means "no relation"; the property is omitted entirely so
            // callers can distinguish it from an id of 0.
            entity.remove(&id_prop);
        }
        if relation.kind == RelationKind::ManyToMany {
            // This entity's own grouping helper, projected when it was
            // embedded through the inverse side of this relation.
            if let Some(junction) = &relation.junction {
                entity.remove(&format!(
                    "{}_{}",
                    junction.table_name, junction.remote_column
                ));
            }
        }
        Ok(())
    }

    fn hydrate_data_child(
        &self,
        relation: &RelationMeta,
        child: &NodeBody,
        entity: &mut Map<String, Json>,
    ) -> FetchResult<()> {
        let prop = &relation.property_name;
        if relation.kind.is_to_many() {
            let raw = entity.remove(prop).unwrap_or(Json::Null);
            let mut items = raw.as_array().cloned().unwrap_or_default();
            let child_pk = &child.meta.primary_key_property;
            items.sort_by_key(|item| {
                item.get(child_pk).and_then(Json::as_i64).unwrap_or(i64::MAX)
            });
            for item in &mut items {
                if let Some(obj) = item.as_object_mut() {
                    self.hydrate_entity(child, obj)?;
                    if relation.kind == RelationKind::ManyToMany {
                        if let Some(junction) = &relation.junction {
                            obj.remove(&junction_helper_key(junction));
                        }
                    }
                }
            }
            entity.insert(prop.clone(), Json::Array(items));
        } else {
            match entity.get_mut(prop) {
                None => {}
                Some(Json::Null) => {
                    entity.remove(prop);
                }
                Some(value) => {
                    if let Some(obj) = value.as_object_mut() {
                        self.hydrate_entity(child, obj)?;
                    }
                }
            }
        }
        Ok(())
    }
}
