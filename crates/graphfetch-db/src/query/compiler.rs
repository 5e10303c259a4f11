//! The SQL compiler: one query tree in, one PostgreSQL statement out.
//!
//! The compiler walks a [`QueryNode`] tree and emits a single nested query
//! in which every relation is resolved through a `LEFT JOIN LATERAL`
//! subquery. To-one data children inline one `row_to_json` object, to-many
//! data children aggregate with `json_agg`, and id-only children project
//! just the foreign-key value under the relation's registered id-property
//! name. Lateral joins keep the plan index-bound: each subquery is driven by
//! the outer row's key rather than a full child-table scan.
//!
//! The root node is restricted by the literal [`IDS_PLACEHOLDER`] token; the
//! executor substitutes `$1..$B` (stored function), or inlines the ids (raw
//! fallback), before the statement reaches the database.

use graphfetch_core::{FetchError, FetchResult};

use crate::query::functions::IDS_PLACEHOLDER;
use crate::query::tree::{NodeBody, QueryNode};
use crate::schema::catalog::SchemaCatalog;
use crate::schema::meta::{JunctionMeta, RelationKind, RelationMeta};

/// Context describing the edge from a parent node to the node being
/// compiled.
struct ParentLink<'a> {
    body: &'a NodeBody,
    relation: &'a RelationMeta,
}

/// Compiles query trees against a schema catalog.
pub struct SqlCompiler<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> SqlCompiler<'a> {
    /// Creates a compiler over the given catalog.
    pub const fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    /// Compiles the full tree into one SQL statement.
    ///
    /// # Errors
    ///
    /// `ImplementationError` if the root is not a data node; `SchemaError` /
    /// `UnsupportedComposite` for metadata inconsistencies discovered while
    /// walking the tree.
    pub fn compile(&self, root: &QueryNode) -> FetchResult<String> {
        match root {
            QueryNode::Data(body) => self.compile_node(body, None),
            QueryNode::Ids(_) => Err(FetchError::ImplementationError(
                "query tree root must be a data node".to_string(),
            )),
        }
    }

    /// Compiles one node into a complete SELECT statement.
    fn compile_node(&self, node: &NodeBody, parent: Option<&ParentLink<'_>>) -> FetchResult<String> {
        let alias = &node.alias;
        let meta = &node.meta;
        let pk = &meta.primary_key_column;
        let table_path = self.catalog.table_path(meta);

        let mut selects: Vec<String> = Vec::new();
        let mut joins: Vec<String> = Vec::new();

        // Own columns first.
        for column in &meta.columns {
            selects.push(format!(
                "\"{alias}\".\"{}\" AS \"{}\"",
                column.column_name, column.property_name
            ));
        }

        // A node reached through a many-to-many relation joins its parent's
        // junction and projects the grouping key its parent aggregates on.
        let mut junction_join = String::new();
        let restriction = match parent {
            None => format!("\"{alias}\".\"{pk}\" IN ({IDS_PLACEHOLDER})"),
            Some(link) => {
                let parent_alias = &link.body.alias;
                let parent_pk = &link.body.meta.primary_key_column;
                match link.relation.kind {
                    RelationKind::ManyToOne | RelationKind::OwnerToOne => {
                        let jc = link.relation.join_column()?;
                        format!(
                            "\"{alias}\".\"{pk}\" = \"{parent_alias}\".\"{}\"",
                            jc.column_name
                        )
                    }
                    RelationKind::OneToOwner | RelationKind::OneToMany => {
                        let fk = self
                            .catalog
                            .fk_referencing(meta, &link.body.meta.table_name)?;
                        format!(
                            "\"{alias}\".\"{}\" = \"{parent_alias}\".\"{parent_pk}\"",
                            fk.single_column()?
                        )
                    }
                    RelationKind::ManyToMany => {
                        let junction = link.relation.junction()?;
                        let junction_alias = format!("{parent_alias}_{alias}_junction");
                        junction_join = format!(
                            " LEFT JOIN {} \"{junction_alias}\" ON \"{junction_alias}\".\"{}\" = \"{alias}\".\"{pk}\"",
                            self.catalog.raw_table_path(&junction.table_name),
                            junction.remote_column
                        );
                        selects.push(format!(
                            "\"{junction_alias}\".\"{}\" AS \"{}\"",
                            junction.own_column,
                            junction_helper_key(junction)
                        ));
                        format!(
                            "\"{junction_alias}\".\"{}\" = \"{parent_alias}\".\"{parent_pk}\"",
                            junction.own_column
                        )
                    }
                }
            }
        };

        // One child per relation, in declaration order.
        for (relation, child) in meta.relations.iter().zip(&node.children) {
            match child {
                QueryNode::Ids(child_body) => {
                    self.compile_ids_child(node, relation, child_body, &mut selects, &mut joins)?;
                }
                QueryNode::Data(child_body) => {
                    self.compile_data_child(node, relation, child_body, &mut selects, &mut joins)?;
                }
            }
        }

        Ok(format!(
            "SELECT {} FROM {table_path} \"{alias}\"{junction_join}{} WHERE {restriction}",
            selects.join(", "),
            joins.join("")
        ))
    }

    /// Projects an id-only child: just the foreign-key value(s) under the
    /// relation's registered id-property name.
    fn compile_ids_child(
        &self,
        node: &NodeBody,
        relation: &RelationMeta,
        child: &NodeBody,
        selects: &mut Vec<String>,
        joins: &mut Vec<String>,
    ) -> FetchResult<()> {
        let alias = &node.alias;
        let pk = &node.meta.primary_key_column;
        let id_prop = self
            .catalog
            .id_property(&node.meta.table_name, &relation.property_name)?;

        match relation.kind {
            // The FK column is local: select it directly.
            RelationKind::ManyToOne | RelationKind::OwnerToOne => {
                let jc = relation.join_column()?;
                selects.push(format!(
                    "\"{alias}\".\"{}\" AS \"{id_prop}\"",
                    jc.column_name
                ));
            }
            RelationKind::OneToOwner => {
                let child_alias = &child.alias;
                let child_pk = &child.meta.primary_key_column;
                let child_path = self.catalog.table_path(&child.meta);
                let fk_col = self
                    .catalog
                    .fk_referencing(&child.meta, &node.meta.table_name)?
                    .single_column()?
                    .to_string();
                let join_alias = format!("{child_alias}_join");
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT \"{child_alias}\".\"{child_pk}\" AS \"{id_prop}\", \
                     \"{child_alias}\".\"{fk_col}\" AS \"{fk_col}\" FROM {child_path} \"{child_alias}\" \
                     WHERE \"{child_alias}\".\"{fk_col}\" = \"{alias}\".\"{pk}\") \"{join_alias}\" \
                     ON \"{join_alias}\".\"{fk_col}\" = \"{alias}\".\"{pk}\""
                ));
                selects.push(format!("\"{join_alias}\".\"{id_prop}\" AS \"{id_prop}\""));
            }
            RelationKind::OneToMany => {
                let child_alias = &child.alias;
                let child_pk = &child.meta.primary_key_column;
                let child_path = self.catalog.table_path(&child.meta);
                let fk_col = self
                    .catalog
                    .fk_referencing(&child.meta, &node.meta.table_name)?
                    .single_column()?
                    .to_string();
                let join_alias = format!("{child_alias}_join");
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT json_agg(\"{child_alias}\".\"{child_pk}\") AS \"{id_prop}\", \
                     \"{child_alias}\".\"{fk_col}\" AS \"{fk_col}\" FROM {child_path} \"{child_alias}\" \
                     WHERE \"{child_alias}\".\"{fk_col}\" = \"{alias}\".\"{pk}\" \
                     GROUP BY \"{child_alias}\".\"{fk_col}\") \"{join_alias}\" \
                     ON \"{alias}\".\"{pk}\" = \"{join_alias}\".\"{fk_col}\""
                ));
                selects.push(format!("\"{join_alias}\".\"{id_prop}\" AS \"{id_prop}\""));
            }
            RelationKind::ManyToMany => {
                let junction = relation.junction()?;
                let junction_alias = format!("{alias}_{}_junction", child.alias);
                let join_alias = format!("{}_join", child.alias);
                let junction_path = self.catalog.raw_table_path(&junction.table_name);
                let own = &junction.own_column;
                let remote = &junction.remote_column;
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT json_agg(\"{junction_alias}\".\"{remote}\") AS \"{id_prop}\", \
                     \"{junction_alias}\".\"{own}\" AS \"{own}\" FROM {junction_path} \"{junction_alias}\" \
                     WHERE \"{junction_alias}\".\"{own}\" = \"{alias}\".\"{pk}\" \
                     GROUP BY \"{junction_alias}\".\"{own}\") \"{join_alias}\" \
                     ON \"{join_alias}\".\"{own}\" = \"{alias}\".\"{pk}\""
                ));
                selects.push(format!("\"{join_alias}\".\"{id_prop}\" AS \"{id_prop}\""));
            }
        }
        Ok(())
    }

    /// Embeds a data child: the recursively compiled subquery wrapped in
    /// `row_to_json` (to-one) or `json_agg` (to-many).
    fn compile_data_child(
        &self,
        node: &NodeBody,
        relation: &RelationMeta,
        child: &NodeBody,
        selects: &mut Vec<String>,
        joins: &mut Vec<String>,
    ) -> FetchResult<()> {
        let alias = &node.alias;
        let pk = &node.meta.primary_key_column;
        let prop = &relation.property_name;
        let join_alias = format!("{}_join", child.alias);
        let link = ParentLink {
            body: node,
            relation,
        };
        let subquery = self.compile_node(child, Some(&link))?;

        match relation.kind {
            RelationKind::ManyToOne | RelationKind::OwnerToOne => {
                let jc = relation.join_column()?;
                let child_pk_prop = &child.meta.primary_key_property;
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT row_to_json(t) AS \"{prop}\", t.\"{child_pk_prop}\" \
                     FROM ({subquery}) t) \"{join_alias}\" \
                     ON \"{join_alias}\".\"{child_pk_prop}\" = \"{alias}\".\"{}\"",
                    jc.column_name
                ));
            }
            RelationKind::OneToOwner => {
                let backlink = self
                    .catalog
                    .find_backlink(&child.meta, &node.meta, relation)?;
                let backlink_id_prop = self
                    .catalog
                    .id_property(&child.meta.table_name, &backlink.property_name)?;
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT row_to_json(t) AS \"{prop}\", t.\"{backlink_id_prop}\" \
                     FROM ({subquery}) t) \"{join_alias}\" \
                     ON \"{join_alias}\".\"{backlink_id_prop}\" = \"{alias}\".\"{pk}\""
                ));
            }
            RelationKind::OneToMany => {
                let backlink = self
                    .catalog
                    .find_backlink(&child.meta, &node.meta, relation)?;
                let backlink_id_prop = self
                    .catalog
                    .id_property(&child.meta.table_name, &backlink.property_name)?;
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT json_agg(a.\"{prop}\") AS \"{prop}\", a.\"{backlink_id_prop}\" \
                     FROM (SELECT t.\"{backlink_id_prop}\", row_to_json(t) AS \"{prop}\" FROM ({subquery}) t) a \
                     WHERE a.\"{backlink_id_prop}\" = \"{alias}\".\"{pk}\" \
                     GROUP BY a.\"{backlink_id_prop}\") \"{join_alias}\" \
                     ON \"{join_alias}\".\"{backlink_id_prop}\" = \"{alias}\".\"{pk}\""
                ));
            }
            RelationKind::ManyToMany => {
                // The subquery restricted itself through the junction and
                // projects the grouping key under the helper name.
                let junction = relation.junction()?;
                let helper = junction_helper_key(junction);
                joins.push(format!(
                    " LEFT JOIN LATERAL (SELECT json_agg(row_to_json(a)) AS \"{prop}\", a.\"{helper}\" \
                     FROM ({subquery}) a GROUP BY a.\"{helper}\") \"{join_alias}\" \
                     ON \"{join_alias}\".\"{helper}\" = \"{alias}\".\"{pk}\""
                ));
            }
        }
        selects.push(format!("\"{join_alias}\".\"{prop}\" AS \"{prop}\""));
        Ok(())
    }
}

/// The name under which a many-to-many subquery projects its grouping key.
/// The hydrator strips this helper from every returned child object.
pub fn junction_helper_key(junction: &JunctionMeta) -> String {
    format!("{}_{}", junction.table_name, junction.own_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tree::{build_query_tree, FetchTree};
    use crate::schema::columns::ColumnType;
    use crate::schema::meta::{EntityDef, JoinColumn, JunctionMeta};

    fn catalog() -> SchemaCatalog {
        let mut cat = SchemaCatalog::new("main");
        cat.register(
            EntityDef::new("author", "author")
                .primary_key("id", "id", ColumnType::BigInt)
                .column("name", "full_name", ColumnType::Text)
                .relation(RelationMeta::one_to_many("books", "book", Some("author")))
                .relation(RelationMeta::owner_to_one(
                    "profile",
                    "profile",
                    Some("author"),
                    JoinColumn::new("profile_id", "id"),
                ))
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
            EntityDef::new("profile", "profile")
                .primary_key("id", "id", ColumnType::BigInt)
                .column("bio", "bio", ColumnType::Text)
                .relation(RelationMeta::one_to_owner("author", "author", Some("profile"))),
        )
        .unwrap();
        cat.register(
            EntityDef::new("tag", "tag")
                .primary_key("id", "id", ColumnType::BigInt)
                .column("label", "label", ColumnType::Text)
                .relation(RelationMeta::many_to_many(
                    "authors",
                    "author",
                    Some("tags"),
                    false,
                    JunctionMeta::new("author_tag", "tag_id", "author_id"),
                )),
        )
        .unwrap();
        cat.with_relation_id("author", "books", "bookIds");
        cat.with_relation_id("author", "profile", "profileId");
        cat.with_relation_id("author", "tags", "tagIds");
        cat.with_relation_id("book", "author", "authorId");
        cat.with_relation_id("profile", "author", "authorId");
        cat.with_relation_id("tag", "authors", "authorIds");
        cat
    }

    fn compile(fetch: &FetchTree) -> String {
        let cat = catalog();
        let tree = build_query_tree(&cat, fetch).unwrap();
        SqlCompiler::new(&cat).compile(&tree).unwrap()
    }

    #[test]
    fn test_root_restriction_uses_placeholder() {
        let sql = compile(&FetchTree::new("book"));
        assert!(sql.contains("WHERE \"rel_1\".\"id\" IN (:...ids)"));
        assert!(sql.starts_with("SELECT \"rel_1\".\"id\" AS \"id\", \"rel_1\".\"title\" AS \"title\""));
    }

    #[test]
    fn test_own_columns_aliased_by_property() {
        let sql = compile(&FetchTree::new("author"));
        assert!(sql.contains("\"rel_1\".\"full_name\" AS \"name\""));
    }

    #[test]
    fn test_local_fk_ids_child_selects_column() {
        // book -> author is many-to-one; its id child is just the FK column.
        let sql = compile(&FetchTree::new("book"));
        assert!(sql.contains("\"rel_1\".\"author_id\" AS \"authorId\""));
        assert!(!sql.contains("LATERAL"));
    }

    #[test]
    fn test_one_to_many_ids_child_aggregates() {
        let sql = compile(&FetchTree::new("author"));
        assert!(sql.contains("LEFT JOIN LATERAL (SELECT json_agg(\"rel_2\".\"id\") AS \"bookIds\""));
        assert!(sql.contains("GROUP BY \"rel_2\".\"author_id\""));
        assert!(sql.contains("\"rel_2_join\".\"bookIds\" AS \"bookIds\""));
    }

    #[test]
    fn test_many_to_many_ids_child_uses_junction() {
        let sql = compile(&FetchTree::new("author"));
        assert!(sql.contains("json_agg(\"rel_1_rel_4_junction\".\"tag_id\") AS \"tagIds\""));
        assert!(sql.contains("FROM \"main\".\"author_tag\" \"rel_1_rel_4_junction\""));
        assert!(sql.contains("GROUP BY \"rel_1_rel_4_junction\".\"author_id\""));
    }

    #[test]
    fn test_owner_to_one_ids_child_selects_local_fk() {
        let sql = compile(&FetchTree::new("author"));
        assert!(sql.contains("\"rel_1\".\"profile_id\" AS \"profileId\""));
    }

    #[test]
    fn test_one_to_owner_ids_child_joins_remote() {
        // profile -> author is one-to-owner: the FK lives on author.
        let sql = compile(&FetchTree::new("profile"));
        assert!(sql.contains(
            "LEFT JOIN LATERAL (SELECT \"rel_2\".\"id\" AS \"authorId\", \"rel_2\".\"profile_id\" AS \"profile_id\""
        ));
        assert!(sql.contains("WHERE \"rel_2\".\"profile_id\" = \"rel_1\".\"id\""));
    }

    #[test]
    fn test_one_to_many_data_child() {
        let sql = compile(&FetchTree::new("author").nested(FetchTree::new("book")));
        // The nested book subquery is restricted by the parent's id.
        assert!(sql.contains("WHERE \"rel_2\".\"author_id\" = \"rel_1\".\"id\""));
        // The aggregation wraps rows and groups by the backlink id-property.
        assert!(sql.contains("json_agg(a.\"books\") AS \"books\""));
        assert!(sql.contains("GROUP BY a.\"authorId\""));
        assert!(sql.contains("\"rel_2_join\".\"books\" AS \"books\""));
    }

    #[test]
    fn test_many_to_one_data_child() {
        let sql = compile(&FetchTree::new("book").nested(FetchTree::new("author")));
        assert!(sql.contains("row_to_json(t) AS \"author\""));
        // The child subquery is keyed to the local FK column.
        assert!(sql.contains("WHERE \"rel_2\".\"id\" = \"rel_1\".\"author_id\""));
        assert!(sql.contains("ON \"rel_2_join\".\"id\" = \"rel_1\".\"author_id\""));
    }

    #[test]
    fn test_many_to_many_data_child() {
        let sql = compile(&FetchTree::new("author").nested(FetchTree::new("tag")));
        // The nested tag node joins the junction and projects the helper key.
        assert!(sql.contains(
            "LEFT JOIN \"main\".\"author_tag\" \"rel_1_rel_4_junction\" ON \"rel_1_rel_4_junction\".\"tag_id\" = \"rel_4\".\"id\""
        ));
        assert!(sql.contains("\"rel_1_rel_4_junction\".\"author_id\" AS \"author_tag_author_id\""));
        assert!(sql.contains("WHERE \"rel_1_rel_4_junction\".\"author_id\" = \"rel_1\".\"id\""));
        // The outer aggregation groups on the helper.
        assert!(sql.contains("json_agg(row_to_json(a)) AS \"tags\""));
        assert!(sql.contains("GROUP BY a.\"author_tag_author_id\""));
    }

    #[test]
    fn test_every_injected_join_is_lateral() {
        let sql = compile(
            &FetchTree::new("author")
                .nested(FetchTree::new("book"))
                .nested(FetchTree::new("tag")),
        );
        // Junction joins aside, every subselect join must be lateral.
        let plain = sql.matches("LEFT JOIN (SELECT").count();
        assert_eq!(plain, 0, "found non-lateral subselect join in: {sql}");
        assert!(sql.matches("LEFT JOIN LATERAL (SELECT").count() >= 3);
    }

    #[test]
    fn test_compile_rejects_ids_root() {
        let cat = catalog();
        let tree = build_query_tree(&cat, &FetchTree::new("author")).unwrap();
        let body = match tree {
            QueryNode::Data(body) => body,
            QueryNode::Ids(_) => unreachable!(),
        };
        let err = SqlCompiler::new(&cat)
            .compile(&QueryNode::Ids(body))
            .unwrap_err();
        assert!(matches!(err, FetchError::ImplementationError(_)));
    }

    #[test]
    fn test_unmapped_id_property_errors() {
        let mut cat = catalog();
        cat.reset_relation_ids();
        let tree = build_query_tree(&cat, &FetchTree::new("book")).unwrap();
        assert!(SqlCompiler::new(&cat).compile(&tree).is_err());
    }
}
