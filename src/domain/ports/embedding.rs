//! Embedding backend port.

use async_trait::async_trait;

use crate::domain::errors::KernelResult;

/// Converts text into a fixed-dimension dense vector.
///
/// Callers go through the cache hierarchy first; the backend only sees
/// cache misses.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embedding dimension for this backend.
    fn dimension(&self) -> usize;

    async fn embed_text(&self, text: &str) -> KernelResult<Vec<f32>>;
}

/// A deterministic, dependency-free embedding used when no backend is
/// configured and in tests.
///
/// Hashes character trigrams into a small fixed-dimension vector. Not
/// semantically meaningful, but stable: identical text yields identical
/// vectors, which is all the cache-dedup paths need.
#[derive(Debug, Clone)]
pub struct NullEmbedding {
    dimension: usize,
}

impl NullEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for NullEmbedding {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingBackend for NullEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> KernelResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let lower = text.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        for window in chars.windows(3) {
            let mut h: u64 = 1469598103934665603;
            for &c in window {
                h ^= c as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let slot = (h % self.dimension as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_embedding_is_deterministic() {
        let backend = NullEmbedding::default();
        let a = backend.embed_text("quarterly revenue report").await.unwrap();
        let b = backend.embed_text("quarterly revenue report").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), backend.dimension());
    }

    #[tokio::test]
    async fn different_text_diverges() {
        let backend = NullEmbedding::default();
        let a = backend.embed_text("alpha").await.unwrap();
        let b = backend.embed_text("omega").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_norm() {
        let backend = NullEmbedding::default();
        let v = backend.embed_text("normalize me please").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
