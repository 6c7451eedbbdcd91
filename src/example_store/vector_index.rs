//! In-memory k-NN mirror over Example embeddings (§3 expansion:
//! `cf_example_vectors`). Rebuilt by the background embedding indexer
//! whenever new vectors are approved — `instant-distance`'s HNSW structure
//! is immutable once built, so "eventually visible to retrieval" (§5) is
//! implemented as periodic rebuild rather than incremental insert.

use crate::embeddings::cosine_similarity;
use instant_distance::{Builder, HnswMap, Point, Search};
use uuid::Uuid;

#[derive(Clone)]
struct EmbeddingPoint(Vec<f32>);

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - cosine_similarity(&self.0, &other.0)
    }
}

pub struct VectorIndex {
    map: Option<HnswMap<EmbeddingPoint, Uuid>>,
}

impl VectorIndex {
    pub fn build(entries: Vec<(Uuid, Vec<f32>)>) -> Self {
        if entries.is_empty() {
            return Self { map: None };
        }
        let (ids, vectors): (Vec<Uuid>, Vec<Vec<f32>>) = entries.into_iter().unzip();
        let points: Vec<EmbeddingPoint> = vectors.into_iter().map(EmbeddingPoint).collect();
        let map = Builder::default().build(points, ids);
        Self { map: Some(map) }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_none()
    }

    /// Returns up to `top_k` `(example_id, cosine_similarity)` pairs.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<(Uuid, f32)> {
        let Some(map) = &self.map else { return Vec::new() };
        let point = EmbeddingPoint(query.to_vec());
        let mut search = Search::default();
        map.search(&point, &mut search)
            .take(top_k)
            .map(|item| (*item.value, 1.0 - item.distance))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_returns_no_results() {
        let index = VectorIndex::build(vec![]);
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn search_returns_closest_vector_first() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let index = VectorIndex::build(vec![(a, vec![1.0, 0.0]), (b, vec![0.0, 1.0])]);
        let results = index.search(&[0.9, 0.1], 1);
        assert_eq!(results[0].0, a);
    }
}
