//! Embedding Service (C3) — turns text into vectors for the Example Store's
//! k-NN retrieval strategy and for schema-aware table scoring.

pub mod openai;

use crate::types::Result;
use async_trait::async_trait;

/// One embedding backend. Concrete providers (OpenAI, a local model, ...)
/// are an explicit out-of-scope collaborator beyond the `openai` reference
/// implementation; callers depend only on this trait.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
}

/// Cosine similarity between two equal-length vectors, clamped to `[-1, 1]`.
/// Returns `0.0` for a zero-magnitude vector rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Deterministic offline embedder for tests: hashes token n-grams into a
/// fixed-width vector. Never calls out to a network.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let idx = (bytes[0] as usize) % self.dimensions;
            v[idx] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_yields_zero_similarity() {
        let zero = vec![0.0, 0.0];
        let other = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.embed("find all customers").await.unwrap();
        let b = embedder.embed("find all customers").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn hashing_embedder_distinguishes_different_text() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.embed("find all customers").await.unwrap();
        let b = embedder.embed("count active orders").await.unwrap();
        assert_ne!(a, b);
    }
}
