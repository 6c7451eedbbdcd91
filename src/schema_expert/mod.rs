//! Schema Expert (C5) — narrows the full provider schema down to the tables
//! and relationships likely to answer a question, overlaid with annotations.

use crate::provider::Provider;
use crate::storage::keys::{annotation_key, CF_ANNOTATIONS};
use crate::storage::Storage;
use crate::types::{column_target_name, Annotation, Relationship, Result, SchemaContext, Table};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Owns the annotation repository the Schema Expert reads from, keyed by
/// table/column name. Annotations are written by review tooling outside
/// this crate's scope; the orchestrator only ever reads them.
pub struct AnnotationStore {
    storage: Storage,
}

impl AnnotationStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn put(&self, annotation: &Annotation) -> Result<()> {
        let bytes = bincode::serialize(annotation)?;
        self.storage.put(CF_ANNOTATIONS, &annotation_key(&annotation.target_name), &bytes)
    }

    pub fn get(&self, target_name: &str) -> Result<Option<Annotation>> {
        match self.storage.get(CF_ANNOTATIONS, &annotation_key(target_name))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn all(&self) -> Result<BTreeMap<String, Annotation>> {
        self.storage
            .iter_prefix(CF_ANNOTATIONS, b"annotation:")?
            .into_iter()
            .map(|(_, v)| {
                let annotation: Annotation = bincode::deserialize(&v)?;
                Ok((annotation.target_name.clone(), annotation))
            })
            .collect()
    }
}

/// Per-conversation recency of previously-selected tables, feeding the
/// recency prior in step 3 of the scoring algorithm.
#[derive(Default, Clone)]
pub struct ConversationTableHistory {
    selections: HashMap<Uuid, BTreeSet<String>>,
}

impl ConversationTableHistory {
    pub fn record(&mut self, conversation_id: Uuid, tables: impl IntoIterator<Item = String>) {
        self.selections.entry(conversation_id).or_default().extend(tables);
    }

    fn recency_prior(&self, conversation_id: Option<Uuid>, table: &str) -> f64 {
        match conversation_id.and_then(|id| self.selections.get(&id)) {
            Some(tables) if tables.contains(table) => 0.15,
            _ => 0.0,
        }
    }
}

pub struct SchemaExpert {
    top_k: usize,
}

impl SchemaExpert {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Scores a table against the question: lexical match against name +
    /// description + business_terms, searchable-column literal match, and a
    /// recency prior, combined as an unweighted sum then clamped to `[0,1]`.
    fn score_table(
        &self,
        table: &Table,
        question_lower: &str,
        annotations: &BTreeMap<String, Annotation>,
        history: &ConversationTableHistory,
        conversation_id: Option<Uuid>,
    ) -> f64 {
        let mut score = 0.0;

        if question_lower.contains(&table.name.to_lowercase()) {
            score += 0.5;
        }
        if let Some(ann) = annotations.get(&table.name) {
            let desc_lower = ann.description.to_lowercase();
            if !desc_lower.is_empty() && question_lower.split_whitespace().any(|w| desc_lower.contains(w)) {
                score += 0.2;
            }
            for term in &ann.business_terms {
                if question_lower.contains(&term.to_lowercase()) {
                    score += 0.2;
                    break;
                }
            }
        }

        for column in &table.columns {
            let is_searchable = annotations
                .get(&column_target_name(&table.name, &column.name))
                .map(|a| a.is_searchable)
                .unwrap_or(false);
            if is_searchable && question_lower.contains(&column.name.to_lowercase()) {
                score += 0.3;
                break;
            }
        }

        score += history.recency_prior(conversation_id, &table.name);
        score.clamp(0.0, 1.0)
    }

    /// Builds the `SchemaContext` for one question, per §4.3's algorithm.
    pub async fn build_context(
        &self,
        provider: &dyn Provider,
        question: &str,
        annotations: &BTreeMap<String, Annotation>,
        history: &ConversationTableHistory,
        conversation_id: Option<Uuid>,
    ) -> Result<SchemaContext> {
        let schema = provider.get_schema().await?;
        let question_lower = question.to_lowercase();

        let mut scored: Vec<(f64, &Table)> = schema
            .tables
            .iter()
            .map(|table| {
                let score = self.score_table(table, &question_lower, annotations, history, conversation_id);
                (score, table)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut kept: Vec<Table> = scored.into_iter().take(self.top_k).map(|(_, t)| t.clone()).collect();
        let kept_names: BTreeSet<String> = kept.iter().map(|t| t.name.clone()).collect();

        let mut relationships = Vec::new();
        let mut to_add: Vec<Table> = Vec::new();
        for table in &kept {
            for fk in &table.foreign_keys {
                if kept_names.contains(&fk.references_table) {
                    continue;
                }
                let safe = annotations
                    .get(&table.name)
                    .and_then(|a| a.join_hints.get(&fk.references_table))
                    .copied()
                    .unwrap_or(false);
                if !safe {
                    continue;
                }
                if let Some(neighbor) = schema.tables.iter().find(|t| t.name == fk.references_table) {
                    if !to_add.iter().any(|t| t.name == neighbor.name) {
                        to_add.push(neighbor.clone());
                    }
                    relationships.push(Relationship {
                        from_table: table.name.clone(),
                        to_table: fk.references_table.clone(),
                        join_clause: format!(
                            "{}.{} = {}.{}",
                            table.name, fk.column, fk.references_table, fk.references_column
                        ),
                    });
                }
            }
        }
        kept.extend(to_add);

        let relevant_annotations: BTreeMap<String, Annotation> = kept
            .iter()
            .filter_map(|t| annotations.get(&t.name).map(|a| (t.name.clone(), a.clone())))
            .collect();

        Ok(SchemaContext {
            tables: kept,
            relationships,
            annotations: relevant_annotations,
            query_language: Some(provider.describe().query_language),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sql::{SqlProvider, StaticExecutor};
    use crate::provider::SchemaDefinition;
    use crate::types::{Column, ForeignKey};
    use std::sync::Arc;

    fn schema() -> SchemaDefinition {
        SchemaDefinition {
            tables: vec![
                Table {
                    name: "orders".into(),
                    schema_namespace: None,
                    columns: vec![Column {
                        name: "customer_id".into(),
                        type_name: "integer".into(),
                        nullable: false,
                        default: None,
                        is_primary_key: false,
                        is_unique: false,
                        comment: None,
                        nested: None,
                    }],
                    primary_key: vec!["id".into()],
                    indexes: vec![],
                    foreign_keys: vec![ForeignKey {
                        column: "customer_id".into(),
                        references_table: "customers".into(),
                        references_column: "id".into(),
                    }],
                    comment: None,
                },
                Table {
                    name: "customers".into(),
                    schema_namespace: None,
                    columns: vec![],
                    primary_key: vec!["id".into()],
                    indexes: vec![],
                    foreign_keys: vec![],
                    comment: None,
                },
                Table {
                    name: "warehouses".into(),
                    schema_namespace: None,
                    columns: vec![],
                    primary_key: vec!["id".into()],
                    indexes: vec![],
                    foreign_keys: vec![],
                    comment: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn selects_tables_mentioned_in_question() {
        let provider = SqlProvider::new("p1", schema(), Arc::new(StaticExecutor::new()));
        let expert = SchemaExpert::new(8);
        let ctx = expert
            .build_context(&provider, "show me all orders", &BTreeMap::new(), &ConversationTableHistory::default(), None)
            .await
            .unwrap();
        assert!(ctx.has_table("orders"));
    }

    #[tokio::test]
    async fn closes_over_fk_neighborhood_when_join_hint_is_safe() {
        let provider = SqlProvider::new("p1", schema(), Arc::new(StaticExecutor::new()));
        let mut orders_ann = Annotation::for_table("orders", "customer orders");
        orders_ann.join_hints.insert("customers".to_string(), true);
        let mut annotations = BTreeMap::new();
        annotations.insert("orders".to_string(), orders_ann);

        let expert = SchemaExpert::new(8);
        let ctx = expert
            .build_context(&provider, "show me all orders", &annotations, &ConversationTableHistory::default(), None)
            .await
            .unwrap();
        assert!(ctx.has_table("customers"));
        assert_eq!(ctx.relationships.len(), 1);
    }

    #[tokio::test]
    async fn column_level_annotation_drives_the_searchable_column_bonus() {
        let expert = SchemaExpert::new(8);
        let table = schema().tables[0].clone();
        let mut annotations = BTreeMap::new();
        let mut column_ann = Annotation::for_column("orders", "customer_id", "customer id");
        column_ann.is_searchable = true;
        annotations.insert(column_target_name("orders", "customer_id"), column_ann);

        let with_annotation =
            expert.score_table(&table, "find customer_id 42", &annotations, &ConversationTableHistory::default(), None);
        let without_annotation = expert.score_table(
            &table,
            "find customer_id 42",
            &BTreeMap::new(),
            &ConversationTableHistory::default(),
            None,
        );
        assert!(with_annotation > without_annotation);
    }

    #[tokio::test]
    async fn table_level_is_searchable_does_not_leak_to_columns() {
        let expert = SchemaExpert::new(8);
        let table = schema().tables[0].clone();
        let mut table_ann = Annotation::for_table("orders", "orders table");
        table_ann.is_searchable = true;
        let mut annotations = BTreeMap::new();
        annotations.insert("orders".to_string(), table_ann);

        let with_table_annotation =
            expert.score_table(&table, "find customer_id 42", &annotations, &ConversationTableHistory::default(), None);
        let baseline = expert.score_table(
            &table,
            "find customer_id 42",
            &BTreeMap::new(),
            &ConversationTableHistory::default(),
            None,
        );
        assert_eq!(with_table_annotation, baseline, "table-level is_searchable must not make columns searchable");
    }

    #[tokio::test]
    async fn never_invents_tables_outside_provider_schema() {
        let provider = SqlProvider::new("p1", schema(), Arc::new(StaticExecutor::new()));
        let expert = SchemaExpert::new(8);
        let ctx = expert
            .build_context(&provider, "show me all widgets", &BTreeMap::new(), &ConversationTableHistory::default(), None)
            .await
            .unwrap();
        for table in &ctx.tables {
            assert!(schema().tables.iter().any(|t| t.name == table.name));
        }
    }
}
