//! Example retrieval: an in-memory, pre-embedded pool ranked by cosine similarity

use histner_core::models::{AnnotatedExample, RetrievedExample};
use histner_core::{EmbeddingBackend, EmbeddingError};
use serde::Serialize;

/// Default number of examples shown to a model.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug)]
struct PoolEntry {
    example: AnnotatedExample,
    embedding: Vec<f32>,
}

/// The few-shot retrieval corpus. Read-only once built; every example is
/// embedded exactly once.
#[derive(Debug, Default)]
pub struct ExamplePool {
    entries: Vec<PoolEntry>,
}

/// A pool example ranked against a query.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor<'a> {
    pub score: f32,
    pub example: &'a AnnotatedExample,
}

impl Neighbor<'_> {
    pub fn to_retrieved(&self) -> RetrievedExample {
        RetrievedExample {
            id: self.example.id.clone(),
            score: self.score,
        }
    }
}

impl ExamplePool {
    /// Embed all examples in pool order. Examples that fail to embed are
    /// logged and left out of the pool.
    pub async fn build(examples: Vec<AnnotatedExample>, backend: &dyn EmbeddingBackend) -> Self {
        let total = examples.len();
        let mut entries = Vec::with_capacity(total);

        for example in examples {
            match backend.embed(&example.text).await {
                Ok(embedding) => entries.push(PoolEntry { example, embedding }),
                Err(e) => {
                    tracing::warn!(example = %example.id, error = %e, "Skipping pool example, embedding failed");
                }
            }
        }

        tracing::info!(
            backend = backend.name(),
            embedded = entries.len(),
            skipped = total - entries.len(),
            "Built example pool"
        );
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` most similar examples, highest score first. Equal scores keep
    /// pool order. The query's own example is excluded both by id and by
    /// identical text.
    pub fn top_k(
        &self,
        query: &[f32],
        exclude_id: Option<&str>,
        exclude_text: Option<&str>,
        k: usize,
    ) -> Vec<Neighbor<'_>> {
        let mut scored: Vec<Neighbor<'_>> = self
            .entries
            .iter()
            .filter(|e| exclude_id != Some(e.example.id.as_str()))
            .filter(|e| exclude_text.map_or(true, |t| t.trim() != e.example.text.trim()))
            .map(|e| Neighbor {
                score: cosine_similarity(query, &e.embedding),
                example: &e.example,
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    /// Embed `text` with the pool's backend and rank the pool against it.
    pub async fn query(
        &self,
        backend: &dyn EmbeddingBackend,
        text: &str,
        exclude_id: Option<&str>,
        k: usize,
    ) -> Result<Vec<Neighbor<'_>>, EmbeddingError> {
        let embedding = backend.embed(text).await?;
        Ok(self.top_k(&embedding, exclude_id, Some(text), k))
    }
}

/// Cosine similarity; 0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
