//! Retrieval Engine (C6) — four concurrent strategies merged into a single
//! ranked, `top_k`-truncated list of approved Examples.

use crate::embeddings::cosine_similarity;
use crate::example_store::ExampleStore;
use crate::llm::{classify_intent_heuristically, heuristic_keywords};
use crate::types::{Example, Result};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Strategy {
    Keyword,
    Vector,
    SchemaAware,
    Intent,
}

#[derive(Debug, Clone)]
pub struct RankedExample {
    pub example: Example,
    pub final_score: f64,
    pub vector_score: f64,
}

pub struct RetrievalEngine {
    top_k: usize,
    min_similarity: f64,
}

impl RetrievalEngine {
    pub fn new(top_k: usize, min_similarity: f64) -> Self {
        Self { top_k, min_similarity }
    }

    /// Runs the four strategies concurrently and merges their results.
    /// `relevant_tables` comes from the Schema Expert's `SchemaContext`;
    /// `question_embedding` is the caller's precomputed embedding of the
    /// question so this method itself never calls out to the network.
    pub async fn retrieve(
        &self,
        store: &ExampleStore,
        provider_id: &str,
        question: &str,
        question_embedding: &[f32],
        relevant_tables: &BTreeSet<String>,
    ) -> Result<Vec<RankedExample>> {
        let relevant_tables_set: std::collections::HashSet<String> = relevant_tables.iter().cloned().collect();
        let intent = classify_intent_heuristically(question);
        let _keywords = heuristic_keywords(question);

        let (keyword, vector, schema_aware, intent_matches) = tokio::join!(
            self.run_keyword(store, question, provider_id),
            self.run_vector(store, question_embedding, provider_id),
            self.run_schema_aware(store, question, provider_id, &relevant_tables_set),
            self.run_intent(store, provider_id, intent),
        );

        let mut per_strategy: HashMap<Uuid, HashMap<Strategy, f64>> = HashMap::new();
        let mut examples: HashMap<Uuid, Example> = HashMap::new();

        for (id, example, score) in log_strategy_failure(keyword, "keyword") {
            examples.insert(id, example);
            per_strategy.entry(id).or_default().insert(Strategy::Keyword, score);
        }
        for (id, example, score) in log_strategy_failure(vector, "vector") {
            examples.insert(id, example);
            per_strategy.entry(id).or_default().insert(Strategy::Vector, score);
        }
        for (id, example, score) in log_strategy_failure(schema_aware, "schema_aware") {
            examples.insert(id, example);
            per_strategy.entry(id).or_default().insert(Strategy::SchemaAware, score);
        }
        for (id, example, score) in log_strategy_failure(intent_matches, "intent") {
            examples.insert(id, example);
            per_strategy.entry(id).or_default().insert(Strategy::Intent, score);
        }

        let mut ranked: Vec<RankedExample> = per_strategy
            .into_iter()
            .filter_map(|(id, scores)| {
                let example = examples.get(&id)?.clone();
                let mean = scores.values().sum::<f64>() / scores.len() as f64;
                let boost = if example.is_good_example { 1.1 } else { 0.7 };
                let final_score = (mean * boost).clamp(0.0, 1.0);
                let vector_score = *scores.get(&Strategy::Vector).unwrap_or(&0.0);
                Some(RankedExample { example, final_score, vector_score })
            })
            .filter(|r| r.final_score >= self.min_similarity)
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.vector_score.partial_cmp(&a.vector_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.example.reviewed_at.cmp(&a.example.reviewed_at))
        });
        ranked.truncate(self.top_k);
        Ok(ranked)
    }

    async fn run_keyword(
        &self,
        store: &ExampleStore,
        question: &str,
        provider_id: &str,
    ) -> Result<Vec<(Uuid, Example, f64)>> {
        Ok(store
            .keyword_search(question, provider_id, self.top_k * 4)?
            .into_iter()
            .map(|(e, score)| (e.id, e, score))
            .collect())
    }

    async fn run_vector(
        &self,
        store: &ExampleStore,
        question_embedding: &[f32],
        provider_id: &str,
    ) -> Result<Vec<(Uuid, Example, f64)>> {
        let mut out = Vec::new();
        for example in store.approved_for_provider(provider_id)? {
            if let Some(bytes) =
                store.storage_get_vector(example.id)?
            {
                let vector: Vec<f32> = bincode::deserialize(&bytes)?;
                let score = cosine_similarity(question_embedding, &vector) as f64;
                out.push((example.id, example, score));
            }
        }
        out.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(self.top_k * 4);
        Ok(out)
    }

    async fn run_schema_aware(
        &self,
        store: &ExampleStore,
        question: &str,
        provider_id: &str,
        relevant_tables: &std::collections::HashSet<String>,
    ) -> Result<Vec<(Uuid, Example, f64)>> {
        if relevant_tables.is_empty() {
            return Ok(Vec::new());
        }
        Ok(store
            .keyword_search_restricted(question, provider_id, relevant_tables, self.top_k * 4)?
            .into_iter()
            .map(|(e, score)| (e.id, e, score))
            .collect())
    }

    async fn run_intent(
        &self,
        store: &ExampleStore,
        provider_id: &str,
        intent: crate::types::Intent,
    ) -> Result<Vec<(Uuid, Example, f64)>> {
        Ok(store
            .intent_search(provider_id, intent, self.top_k * 4)?
            .into_iter()
            .map(|e| (e.id, e, 1.0))
            .collect())
    }
}

/// Any individual strategy failure is logged and skipped; the engine
/// succeeds as long as at least one strategy produced results (§4.4).
fn log_strategy_failure(result: Result<Vec<(Uuid, Example, f64)>>, strategy: &str) -> Vec<(Uuid, Example, f64)> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(strategy, error = %e, "retrieval strategy failed, skipping");
            Vec::new()
        }
    }
}
