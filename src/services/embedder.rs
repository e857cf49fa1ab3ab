//! Cache-fronted embedding lookups.
//!
//! All embedding traffic goes through L3 first, keyed by content hash of
//! the text, so semantically identical requests from any tier dedupe to
//! a single backend RPC.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::domain::errors::KernelResult;
use crate::domain::models::ids::CacheKey;
use crate::domain::ports::embedding::EmbeddingBackend;
use crate::infrastructure::hashing::generate_cache_key;

use super::cache::{CacheDataKind, CacheHierarchy};

pub const EMBED_NAMESPACE: &str = "embed_text";

/// Content-hash key for an embedding request.
pub fn embedding_key(text: &str) -> CacheKey {
    generate_cache_key(EMBED_NAMESPACE, &json!({ "text": text }))
}

/// Embedding lookups with L3 caching.
pub struct CachedEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Arc<CacheHierarchy>,
}

impl CachedEmbedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, cache: Arc<CacheHierarchy>) -> Self {
        Self { backend, cache }
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed `text`, hitting L3 before the backend.
    pub async fn embed(&self, text: &str) -> KernelResult<Vec<f32>> {
        let key = embedding_key(text);
        if let Some(cached) = self.cache.read_cache(&key, None).await {
            if let Ok(vector) = serde_json::from_value::<Vec<f32>>(cached) {
                return Ok(vector);
            }
            // Unreadable cached value: treat as a miss and refill.
            self.cache.invalidate(&key, None).await;
        }

        debug!(len = text.len(), "embedding cache miss");
        let vector = self.backend.embed_text(text).await?;
        self.cache
            .write_cache(key, serde_json::to_value(&vector)?, CacheDataKind::Embedding)
            .await;
        Ok(vector)
    }
}

/// Cosine similarity between two vectors; 0.0 when shapes differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::CacheConfig;
    use crate::domain::ports::embedding::NullEmbedding;
    use crate::services::cache::CacheLevel;

    fn embedder() -> CachedEmbedder {
        CachedEmbedder::new(
            Arc::new(NullEmbedding::default()),
            Arc::new(CacheHierarchy::new(&CacheConfig::default())),
        )
    }

    #[tokio::test]
    async fn second_lookup_hits_l3() {
        let embedder = embedder();
        let text = "the same document text";
        let key = embedding_key(text);

        let first = embedder.embed(text).await.unwrap();
        let second = embedder.embed(text).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(embedder.cache.entry_hits(&key, CacheLevel::L3).await, Some(1));
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_shape_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
