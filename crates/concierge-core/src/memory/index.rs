//! ============================================================================
//! Similarity Index - Relevance-ranked retrieval over turn embeddings
//! ============================================================================
//! In-process vector index over retained turns. Queries embed the input via
//! the injected embedding capability, score every row by cosine similarity,
//! and keep hits at or above the configured threshold.
//! ============================================================================

use anyhow::Result;
use std::cmp::Ordering;
use tracing::debug;

use crate::capabilities::SharedEmbedder;

/// Vector rows for retained turns, aligned with the retention store
pub struct SimilarityIndex {
    embedder: SharedEmbedder,
    rows: Vec<(u64, Vec<f32>)>,
}

impl SimilarityIndex {
    pub fn new(embedder: SharedEmbedder) -> Self {
        Self {
            embedder,
            rows: Vec::new(),
        }
    }

    /// Embed arbitrary text with the index's embedding capability
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Add a row for a retained turn
    pub fn index(&mut self, turn_index: u64, embedding: Vec<f32>) {
        self.rows.push((turn_index, embedding));
    }

    /// Drop rows for turns evicted from the retention store
    pub fn remove_below(&mut self, min_index: u64) {
        self.rows.retain(|(idx, _)| *idx >= min_index);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Rank indexed turns against `text`: keep scores >= `threshold`, sort
    /// descending, break ties toward the more recent turn, truncate to
    /// `top_k`. Fails only if the embedding capability fails.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<(u64, f32)>> {
        let query = self.embedder.embed(text).await?;

        let mut hits: Vec<(u64, f32)> = self
            .rows
            .iter()
            .map(|(idx, emb)| (*idx, cosine_similarity(&query, emb)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        hits.truncate(top_k);

        debug!(
            "Similarity query matched {} of {} indexed turns",
            hits.len(),
            self.rows.len()
        );
        Ok(hits)
    }
}

/// Cosine similarity; zero-magnitude vectors (and mismatched lengths beyond
/// the shared prefix) score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
