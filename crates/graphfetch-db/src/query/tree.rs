//! Fetch trees and the normalized query tree.
//!
//! A [`FetchTree`] is the caller's description of which related entities
//! should be returned as full data. The builder expands it against the
//! schema catalog into a [`QueryNode`] tree in which *every* relation of
//! every visited entity is present as exactly one child: a `Data` node when
//! the caller named it, an `Ids` leaf otherwise.

use std::sync::Arc;

use graphfetch_core::FetchResult;

use crate::schema::catalog::SchemaCatalog;
use crate::schema::meta::EntityMeta;

/// A caller-supplied fetch tree naming the relations to return as data.
///
/// # Examples
///
/// ```
/// use graphfetch_db::query::tree::FetchTree;
///
/// let tree = FetchTree::new("author").nested(FetchTree::new("book"));
/// assert_eq!(tree.nested.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FetchTree {
    /// The entity name at this node.
    pub entity: String,
    /// Child fetch trees for relations to embed as data.
    pub nested: Vec<FetchTree>,
}

impl FetchTree {
    /// Creates a fetch tree rooted at the given entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            nested: Vec::new(),
        }
    }

    /// Adds a nested child tree.
    #[must_use]
    pub fn nested(mut self, child: FetchTree) -> Self {
        self.nested.push(child);
        self
    }
}

/// The shared payload of a query tree node.
///
/// `children` aligns index-for-index with `meta.relations`: the builder
/// produces exactly one child per relation, so consumers walk the two
/// vectors zipped.
#[derive(Debug)]
pub struct NodeBody {
    /// The node's unique alias within the tree (`rel_1`, `rel_2`, ...).
    pub alias: String,
    /// The entity metadata at this node.
    pub meta: Arc<EntityMeta>,
    /// One child per relation of `meta`. Empty for `Ids` leaves.
    pub children: Vec<QueryNode>,
}

/// A node of the normalized query tree.
#[derive(Debug)]
pub enum QueryNode {
    /// The entity's full data is selected; relations expand recursively.
    Data(NodeBody),
    /// Only the relation's foreign-key ids are projected.
    Ids(NodeBody),
}

impl QueryNode {
    /// Returns the shared payload.
    pub fn body(&self) -> &NodeBody {
        match self {
            Self::Data(body) | Self::Ids(body) => body,
        }
    }

    /// Returns the kind token used by the tree hash.
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Ids(_) => "ids",
        }
    }

    /// Returns `true` for `Data` nodes.
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}

/// Mints unique aliases within one query tree.
#[derive(Debug, Default)]
pub struct AliasGenerator {
    counter: u32,
}

impl AliasGenerator {
    /// Creates a generator starting at `rel_1`.
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Returns the next alias.
    pub fn next_alias(&mut self) -> String {
        self.counter += 1;
        format!("rel_{}", self.counter)
    }
}

/// Expands a fetch tree into a query tree.
///
/// Depth-first: the node for `fetch.entity` gets a fresh alias, then each
/// relation of that entity produces a child. A relation whose target table
/// matches a nested fetch tree recurses as `Data`; every other relation
/// becomes an `Ids` leaf.
///
/// # Errors
///
/// `SchemaError` for unknown entity names (from the catalog).
pub fn build_query_tree(catalog: &SchemaCatalog, fetch: &FetchTree) -> FetchResult<QueryNode> {
    let mut aliases = AliasGenerator::new();
    build_node(catalog, fetch, &mut aliases).map(QueryNode::Data)
}

fn build_node(
    catalog: &SchemaCatalog,
    fetch: &FetchTree,
    aliases: &mut AliasGenerator,
) -> FetchResult<NodeBody> {
    let meta = Arc::clone(catalog.entity(&fetch.entity)?);
    let alias = aliases.next_alias();

    let mut children = Vec::with_capacity(meta.relations.len());
    for relation in &meta.relations {
        // Resolve nested entity names up front so an unknown name in the
        // fetch tree surfaces even when it matches no relation.
        let mut nested_match = None;
        for child_fetch in &fetch.nested {
            let child_meta = catalog.entity(&child_fetch.entity)?;
            if child_meta.table_name == relation.target_table {
                nested_match = Some(child_fetch);
                break;
            }
        }
        match nested_match {
            Some(child_fetch) => {
                children.push(QueryNode::Data(build_node(catalog, child_fetch, aliases)?));
            }
            None => {
                let child_meta = Arc::clone(catalog.entity_by_table(&relation.target_table)?);
                children.push(QueryNode::Ids(NodeBody {
                    alias: aliases.next_alias(),
                    meta: child_meta,
                    children: Vec::new(),
                }));
            }
        }
    }

    Ok(NodeBody {
        alias,
        meta,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::columns::ColumnType;
    use crate::schema::meta::{EntityDef, JoinColumn, JunctionMeta, RelationMeta};

    fn catalog() -> SchemaCatalog {
        let mut cat = SchemaCatalog::new("main");
        cat.register(
            EntityDef::new("author", "author")
                .primary_key("id", "id", ColumnType::BigInt)
                .column("name", "name", ColumnType::Text)
                .relation(RelationMeta::one_to_many("books", "book", Some("author")))
                .relation(RelationMeta::many_to_many(
                    "tags",
                    "tag",
                    Some("authors"),
                    true,
                    JunctionMeta::new("author_tag", "author_id", "tag_id"),
                )),
        )
        .unwrap();
        cat.register(
            EntityDef::new("book", "book")
                .primary_key("id", "id", ColumnType::BigInt)
                .column("title", "title", ColumnType::Text)
                .relation(RelationMeta::many_to_one(
                    "author",
                    "author",
                    Some("books"),
                    JoinColumn::new("author_id", "id"),
                )),
        )
        .unwrap();
        cat.register(
            EntityDef::new("tag", "tag")
                .primary_key("id", "id", ColumnType::BigInt)
                .relation(RelationMeta::many_to_many(
                    "authors",
                    "author",
                    Some("tags"),
                    false,
                    JunctionMeta::new("author_tag", "tag_id", "author_id"),
                )),
        )
        .unwrap();
        cat
    }

    #[test]
    fn test_alias_generator_monotonic() {
        let mut aliases = AliasGenerator::new();
        assert_eq!(aliases.next_alias(), "rel_1");
        assert_eq!(aliases.next_alias(), "rel_2");
        assert_eq!(aliases.next_alias(), "rel_3");
    }

    #[test]
    fn test_root_is_data() {
        let cat = catalog();
        let tree = build_query_tree(&cat, &FetchTree::new("author")).unwrap();
        assert!(tree.is_data());
        assert_eq!(tree.body().alias, "rel_1");
    }

    #[test]
    fn test_every_relation_gets_a_child() {
        let cat = catalog();
        let tree = build_query_tree(&cat, &FetchTree::new("author")).unwrap();
        let body = tree.body();
        assert_eq!(body.children.len(), body.meta.relations.len());
        // No nesting requested: all children are ids leaves.
        assert!(body.children.iter().all(|c| !c.is_data()));
    }

    #[test]
    fn test_nested_relation_becomes_data() {
        let cat = catalog();
        let fetch = FetchTree::new("author").nested(FetchTree::new("book"));
        let tree = build_query_tree(&cat, &fetch).unwrap();
        let body = tree.body();
        assert!(body.children[0].is_data(), "books child should be data");
        assert!(!body.children[1].is_data(), "tags child should be ids");
        // The nested book node expands its own relations in turn.
        let book = body.children[0].body();
        assert_eq!(book.children.len(), 1);
        assert!(!book.children[0].is_data());
    }

    #[test]
    fn test_aliases_unique_within_tree() {
        let cat = catalog();
        let fetch = FetchTree::new("author").nested(FetchTree::new("book"));
        let tree = build_query_tree(&cat, &fetch).unwrap();
        let mut seen = std::collections::HashSet::new();
        fn walk(node: &QueryNode, seen: &mut std::collections::HashSet<String>) {
            assert!(seen.insert(node.body().alias.clone()), "duplicate alias");
            for child in &node.body().children {
                walk(child, seen);
            }
        }
        walk(&tree, &mut seen);
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_nested_order_does_not_change_shape() {
        // Children follow the entity's relation declaration order, so
        // reordering the caller's nested list must not change the tree.
        let cat = catalog();
        let forward = FetchTree::new("author")
            .nested(FetchTree::new("book"))
            .nested(FetchTree::new("tag"));
        let reversed = FetchTree::new("author")
            .nested(FetchTree::new("tag"))
            .nested(FetchTree::new("book"));
        let a = build_query_tree(&cat, &forward).unwrap();
        let b = build_query_tree(&cat, &reversed).unwrap();
        fn shape(node: &QueryNode, out: &mut String) {
            out.push_str(node.kind_str());
            out.push('-');
            out.push_str(&node.body().alias);
            out.push('-');
            out.push_str(&node.body().meta.table_name);
            out.push(';');
            for child in &node.body().children {
                shape(child, out);
            }
        }
        let (mut sa, mut sb) = (String::new(), String::new());
        shape(&a, &mut sa);
        shape(&b, &mut sb);
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_unknown_entity_errors() {
        let cat = catalog();
        assert!(build_query_tree(&cat, &FetchTree::new("ghost")).is_err());
        let fetch = FetchTree::new("author").nested(FetchTree::new("ghost"));
        assert!(build_query_tree(&cat, &fetch).is_err());
    }

    #[test]
    fn test_tree_shape_deterministic() {
        let cat = catalog();
        let fetch = FetchTree::new("author").nested(FetchTree::new("book"));
        let a = build_query_tree(&cat, &fetch).unwrap();
        let b = build_query_tree(&cat, &fetch).unwrap();
        fn shape(node: &QueryNode, out: &mut String) {
            out.push_str(node.kind_str());
            out.push('-');
            out.push_str(&node.body().alias);
            out.push(';');
            for child in &node.body().children {
                shape(child, out);
            }
        }
        let (mut sa, mut sb) = (String::new(), String::new());
        shape(&a, &mut sa);
        shape(&b, &mut sb);
        assert_eq!(sa, sb);
    }
}
