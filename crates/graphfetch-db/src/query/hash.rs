//! Stable fingerprinting of query trees.
//!
//! The hash keys the stored-function cache: two trees with the same
//! structure, aliases, column sets, and relation shape must hash
//! identically, and any change to kinds, columns, relations, or aliases
//! must change the hash with overwhelming probability. The output is a
//! digits-only string, safe to embed in a PostgreSQL identifier.

use std::collections::VecDeque;

use crate::query::tree::QueryNode;

/// Produces the stable identifier string for a query tree.
///
/// Traversal is breadth-first. Each node contributes
/// `"<kind>-<alias>-<metaDesc>"` where `metaDesc` lists the table, all own
/// column property names, and every relation as
/// `"property:ownTable:inverseTable:kind:isOwning"`. The concatenated
/// description is folded through a 31-polynomial 32-bit hash and rendered
/// as the decimal absolute value.
pub fn tree_hash(root: &QueryNode) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut queue: VecDeque<&QueryNode> = VecDeque::new();
    queue.push_back(root);
    while let Some(node) = queue.pop_front() {
        let body = node.body();
        parts.push(format!(
            "{}-{}-{}",
            node.kind_str(),
            body.alias,
            describe_meta(body)
        ));
        for child in &body.children {
            queue.push_back(child);
        }
    }
    let description = parts.join(":");
    sanitize(&string_hash(&description).unsigned_abs().to_string())
}

fn describe_meta(body: &crate::query::tree::NodeBody) -> String {
    let meta = &body.meta;
    let props: Vec<&str> = meta
        .columns
        .iter()
        .map(|c| c.property_name.as_str())
        .collect();
    let relations: Vec<String> = meta
        .relations
        .iter()
        .map(|r| {
            format!(
                "{}:{}:{}:{}:{}",
                r.property_name,
                meta.table_name,
                r.target_table,
                r.kind.as_str(),
                r.owning
            )
        })
        .collect();
    format!(
        "{}:{}:{}",
        meta.table_name,
        props.join(":"),
        relations.join(",")
    )
}

/// 32-bit polynomial string hash: `h = 31*h + code` with wrapping overflow.
fn string_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for c in s.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as i32);
    }
    h
}

/// Replaces any non-digit character with `'0'` so the result is a legal
/// identifier suffix.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_digit() { c } else { '0' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tree::{build_query_tree, FetchTree};
    use crate::schema::catalog::SchemaCatalog;
    use crate::schema::columns::ColumnType;
    use crate::schema::meta::{EntityDef, JoinColumn, RelationMeta};

    fn catalog(extra_column: bool) -> SchemaCatalog {
        let mut cat = SchemaCatalog::new("main");
        let mut author = EntityDef::new("author", "author")
            .primary_key("id", "id", ColumnType::BigInt)
            .column("name", "name", ColumnType::Text)
            .relation(RelationMeta::one_to_many("books", "book", Some("author")));
        if extra_column {
            author = author.column("born", "born", ColumnType::Date);
        }
        cat.register(author).unwrap();
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
        cat
    }

    #[test]
    fn test_hash_is_digits_only() {
        let cat = catalog(false);
        let tree = build_query_tree(&cat, &FetchTree::new("author")).unwrap();
        let h = tree_hash(&tree);
        assert!(!h.is_empty());
        assert!(h.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_hash_stable_across_invocations() {
        let cat = catalog(false);
        let fetch = FetchTree::new("author").nested(FetchTree::new("book"));
        let a = tree_hash(&build_query_tree(&cat, &fetch).unwrap());
        let b = tree_hash(&build_query_tree(&cat, &fetch).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_differs_for_different_kinds() {
        let cat = catalog(false);
        let ids_only = tree_hash(&build_query_tree(&cat, &FetchTree::new("author")).unwrap());
        let nested = tree_hash(
            &build_query_tree(
                &cat,
                &FetchTree::new("author").nested(FetchTree::new("book")),
            )
            .unwrap(),
        );
        assert_ne!(ids_only, nested);
    }

    #[test]
    fn test_hash_differs_for_different_columns() {
        let without = tree_hash(
            &build_query_tree(&catalog(false), &FetchTree::new("author")).unwrap(),
        );
        let with = tree_hash(&build_query_tree(&catalog(true), &FetchTree::new("author")).unwrap());
        assert_ne!(without, with);
    }

    #[test]
    fn test_string_hash_wraps() {
        // Long inputs must not panic on overflow.
        let long = "x".repeat(10_000);
        let _ = string_hash(&long);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("-123"), "0123");
        assert_eq!(sanitize("456"), "456");
    }
}
