//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus the dimension probe used by the index lifecycle manager and a
//! cosine similarity helper for in-process search.
//!
//! Concrete HTTP providers live in the `carebot` app crate.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Text embedded to discover the active model's output width.
pub const PROBE_SENTINEL: &str = "test";

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-mpnet-base-v2"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        if vectors.is_empty() {
            return Err(Error::remote(self.model_name(), "empty embedding response"));
        }
        Ok(vectors.swap_remove(0))
    }
}

/// Embed the probe sentinel and return the resulting vector width.
pub async fn probe_dimension(embedder: &dyn Embedder) -> Result<usize> {
    let vector = embedder.embed_query(PROBE_SENTINEL).await?;
    if vector.is_empty() {
        return Err(Error::remote(
            embedder.model_name(),
            "embedding probe returned a zero-length vector",
        ));
    }
    tracing::info!(
        model = embedder.model_name(),
        dimension = vector.len(),
        "probed embedding dimension"
    );
    Ok(vector.len())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HashingEmbedder;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_probe_reports_model_width() {
        let embedder = HashingEmbedder::new("hash-1024", 1024);
        assert_eq!(probe_dimension(&embedder).await.unwrap(), 1024);
    }

    #[tokio::test]
    async fn test_probe_rejects_zero_width() {
        let embedder = HashingEmbedder::new("broken", 0);
        let err = probe_dimension(&embedder).await.unwrap_err();
        assert!(matches!(err, Error::RemoteService { .. }));
    }
}
