//! Provider schema and annotation types.
//!
//! `Table`/`Column` are owned by the Provider (§4.1); `Annotation` is owned
//! by an annotation repository and consumed read-only by the Schema Expert
//! (§4.3). `SchemaContext` is the transient, per-turn projection the Schema
//! Expert builds from the two.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    Sql,
    MongoDb,
    Spl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Provider-defined dialect type string (e.g. "integer", "text", "ObjectId").
    #[serde(rename = "type")]
    pub type_name: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub comment: Option<String>,
    /// Recursive schema for object-valued columns (document providers).
    pub nested: Option<Vec<Column>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub schema_namespace: Option<String>,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub comment: Option<String>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A suggested join path between two tables, in provider-native form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub to_table: String,
    pub join_clause: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Table,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Exact,
    Like,
    FullText,
    Range,
}

/// User-supplied semantic metadata attached to a table or column.
///
/// Owned by the annotation repository; the Schema Expert only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub target_kind: TargetKind,
    pub target_name: String,
    pub description: String,
    pub business_terms: BTreeSet<String>,
    pub examples: Vec<String>,
    pub relationships: Vec<String>,
    pub date_format: Option<String>,
    pub enum_values: Option<Vec<String>>,
    pub sensitive: bool,
    pub primary_lookup_column: Option<String>,
    pub is_searchable: bool,
    pub search_type: Option<SearchType>,
    pub default_aggregation: Option<String>,
    /// Whether traversing this relationship edge is high-cardinality-safe,
    /// i.e. safe to pull into the Schema Expert's one-hop FK closure.
    pub join_hints: BTreeMap<String, bool>,
}

impl Annotation {
    pub fn for_table(name: &str, description: impl Into<String>) -> Self {
        Self {
            target_kind: TargetKind::Table,
            target_name: name.to_string(),
            description: description.into(),
            business_terms: BTreeSet::new(),
            examples: Vec::new(),
            relationships: Vec::new(),
            date_format: None,
            enum_values: None,
            sensitive: false,
            primary_lookup_column: None,
            is_searchable: false,
            search_type: None,
            default_aggregation: None,
            join_hints: BTreeMap::new(),
        }
    }

    /// `target_name` is the composite `table.column` key, so a column
    /// annotation lives in the same repository as table annotations without
    /// colliding with them.
    pub fn for_column(table: &str, column: &str, description: impl Into<String>) -> Self {
        Self { target_kind: TargetKind::Column, ..Self::for_table(&column_target_name(table, column), description) }
    }
}

/// The composite key a column-level `Annotation` is stored and looked up
/// under: `{table}.{column}`.
pub fn column_target_name(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

/// The per-turn projection of the provider schema the Schema Expert deemed
/// relevant to a user question.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaContext {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub annotations: BTreeMap<String, Annotation>,
    pub query_language: Option<QueryLanguage>,
}

impl SchemaContext {
    pub fn table_names(&self) -> BTreeSet<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    /// Flatten into a compact textual form suitable for an LLM prompt.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str("table ");
            out.push_str(&table.name);
            if let Some(ann) = self.annotations.get(&table.name) {
                out.push_str(" -- ");
                out.push_str(&ann.description);
            }
            out.push('\n');
            for col in &table.columns {
                out.push_str("  ");
                out.push_str(&col.name);
                out.push(' ');
                out.push_str(&col.type_name);
                if col.is_primary_key {
                    out.push_str(" PRIMARY KEY");
                }
                out.push('\n');
            }
        }
        for rel in &self.relationships {
            out.push_str("-- join: ");
            out.push_str(&rel.join_clause);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(name: &str) -> Table {
        Table {
            name: name.to_string(),
            schema_namespace: None,
            columns: vec![Column {
                name: "id".into(),
                type_name: "integer".into(),
                nullable: false,
                default: None,
                is_primary_key: true,
                is_unique: true,
                comment: None,
                nested: None,
            }],
            primary_key: vec!["id".into()],
            indexes: vec![],
            foreign_keys: vec![],
            comment: None,
        }
    }

    #[test]
    fn flatten_includes_table_and_column_names() {
        let mut ctx = SchemaContext::default();
        ctx.tables.push(sample_table("customers"));
        let flat = ctx.flatten();
        assert!(flat.contains("table customers"));
        assert!(flat.contains("id integer PRIMARY KEY"));
    }

    #[test]
    fn has_table_reflects_membership() {
        let mut ctx = SchemaContext::default();
        ctx.tables.push(sample_table("customers"));
        assert!(ctx.has_table("customers"));
        assert!(!ctx.has_table("customer"));
    }
}
