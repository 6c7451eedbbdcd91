//! Example Store (C4) — CRUD over the `Example` corpus plus the keyword and
//! vector search primitives the Retrieval Engine (C6) composes.

pub mod vector_index;

use crate::embeddings::EmbeddingProvider;
use crate::example_store::vector_index::VectorIndex;
use crate::storage::keys::{example_key, CF_EXAMPLES, CF_EXAMPLE_VECTORS};
use crate::storage::Storage;
use crate::types::{Example, ExampleStatus, Intent, Result};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token-overlap relevance score in `[0, 1]`, the corpus's stand-in for a
/// full BM25 implementation at this scale.
fn keyword_score(question: &str, candidate: &str) -> f64 {
    let q = tokenize(question);
    let c = tokenize(candidate);
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    let overlap = q.intersection(&c).count();
    overlap as f64 / q.len() as f64
}

pub struct ExampleStore {
    storage: Storage,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ExampleStore {
    pub fn new(storage: Storage, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { storage, embedder }
    }

    pub fn put(&self, example: &Example) -> Result<()> {
        let bytes = bincode::serialize(example)?;
        self.storage.put(CF_EXAMPLES, &example_key(example.id), &bytes)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Example>> {
        match self.storage.get(CF_EXAMPLES, &example_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All examples, regardless of status. Callers that need only the
    /// retrieval-eligible corpus should use `approved_for_provider`.
    pub fn all(&self) -> Result<Vec<Example>> {
        let rows = self.storage.iter_prefix(CF_EXAMPLES, b"example:")?;
        rows.into_iter().map(|(_, v)| Ok(bincode::deserialize(&v)?)).collect()
    }

    /// Only `Approved` examples for a provider are ever surfaced to
    /// retrieval (§4.4 strategy filters).
    pub fn approved_for_provider(&self, provider_id: &str) -> Result<Vec<Example>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.status == ExampleStatus::Approved && e.provider_id == provider_id)
            .collect())
    }

    pub fn keyword_search(&self, question: &str, provider_id: &str, top_k: usize) -> Result<Vec<(Example, f64)>> {
        let mut scored: Vec<(Example, f64)> = self
            .approved_for_provider(provider_id)?
            .into_iter()
            .map(|e| {
                let score = keyword_score(question, &e.question);
                (e, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Keyword search restricted to examples whose `involved_tables`
    /// intersect the given schema-relevant table set — the Schema-aware
    /// strategy (§4.4).
    pub fn keyword_search_restricted(
        &self,
        question: &str,
        provider_id: &str,
        relevant_tables: &HashSet<String>,
        top_k: usize,
    ) -> Result<Vec<(Example, f64)>> {
        let mut scored: Vec<(Example, f64)> = self
            .approved_for_provider(provider_id)?
            .into_iter()
            .filter(|e| e.involved_tables.iter().any(|t| relevant_tables.contains(t)))
            .map(|e| {
                let score = keyword_score(question, &e.question);
                (e, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn intent_search(&self, provider_id: &str, intent: Intent, top_k: usize) -> Result<Vec<Example>> {
        let mut matches: Vec<Example> =
            self.approved_for_provider(provider_id)?.into_iter().filter(|e| e.intent == intent).collect();
        matches.sort_by_key(|e| std::cmp::Reverse(e.reviewed_at));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn embed_and_store(&self, example: &Example) -> Result<()> {
        let vector = self.embedder.embed(&example.question).await?;
        let bytes = bincode::serialize(&vector)?;
        self.storage.put(CF_EXAMPLE_VECTORS, &example_key(example.id), &bytes)
    }

    /// Rebuilds the in-memory HNSW mirror from every `embedding_indexed`
    /// approved example, embedding any that are missing a stored vector
    /// along the way. Called by the background embedding-index job.
    pub async fn rebuild_vector_index(&self, provider_id: &str) -> Result<VectorIndex> {
        let mut entries = Vec::new();
        for mut example in self.approved_for_provider(provider_id)? {
            let key = example_key(example.id);
            let vector = match self.storage.get(CF_EXAMPLE_VECTORS, &key)? {
                Some(bytes) => bincode::deserialize::<Vec<f32>>(&bytes)?,
                None => {
                    self.embed_and_store(&example).await?;
                    example.embedding_indexed = true;
                    self.put(&example)?;
                    bincode::deserialize(&self.storage.get(CF_EXAMPLE_VECTORS, &key)?.unwrap())?
                }
            };
            entries.push((example.id, vector));
        }
        Ok(VectorIndex::build(entries))
    }

    pub async fn embed_question(&self, question: &str) -> Result<Vec<f32>> {
        self.embedder.embed(question).await
    }

    /// Raw stored embedding bytes for one example, used by the Retrieval
    /// Engine's vector strategy. Returns `None` when the example has not
    /// been indexed yet — retrieval must not crash on that (§5).
    pub fn storage_get_vector(&self, example_id: Uuid) -> Result<Option<Vec<u8>>> {
        self.storage.get(CF_EXAMPLE_VECTORS, &example_key(example_id))
    }
}
