//! Hybrid relevance scoring (T1).
//!
//! Combines embedding cosine similarity, a precision rerank over the
//! top-k candidates, and reward compliance against boolean constraints.
//! `aggregate_scores` fuses the parts with context-dependent weights:
//! compliance only participates when constraints are present.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::errors::KernelResult;

use super::embedder::{cosine_similarity, CachedEmbedder};

const WITH_CONSTRAINTS: (f64, f64, f64) = (0.4, 0.3, 0.3);
const WITHOUT_CONSTRAINTS: (f64, f64) = (0.6, 0.4);

/// Per-candidate score decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Embedding cosine similarity, mapped into `[0, 1]`.
    pub similarity: f64,
    /// Precision rerank score; zero for candidates outside the top-k.
    pub rerank: f64,
    /// Fraction of satisfied constraints, when any were supplied.
    pub compliance: Option<f64>,
    pub aggregate: f64,
}

/// Fuse the component scores with context-weighted fusion.
pub fn aggregate_scores(similarity: f64, rerank: f64, compliance: Option<f64>) -> f64 {
    let aggregate = match compliance {
        Some(compliance) => {
            let (ws, wr, wc) = WITH_CONSTRAINTS;
            ws * similarity + wr * rerank + wc * compliance
        }
        None => {
            let (ws, wr) = WITHOUT_CONSTRAINTS;
            ws * similarity + wr * rerank
        }
    };
    aggregate.clamp(0.0, 1.0)
}

/// The T1 hybrid scorer.
pub struct HybridScorer {
    embedder: Arc<CachedEmbedder>,
    /// Candidates passed to the precision rerank stage.
    top_k: usize,
}

impl HybridScorer {
    pub fn new(embedder: Arc<CachedEmbedder>) -> Self {
        Self { embedder, top_k: 5 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Score a single candidate against the query.
    pub async fn score(
        &self,
        query: &str,
        candidate: &str,
        constraints: &[bool],
    ) -> KernelResult<ScoreBreakdown> {
        let ranked = self
            .rank(query, std::slice::from_ref(&candidate.to_string()), Some(&[constraints.to_vec()]))
            .await?;
        Ok(ranked.into_iter().next().map(|(_, b)| b).unwrap_or(ScoreBreakdown {
            similarity: 0.0,
            rerank: 0.0,
            compliance: None,
            aggregate: 0.0,
        }))
    }

    /// Rank candidates against the query, best first.
    ///
    /// `constraints` supplies one boolean vector per candidate; pass
    /// `None` when no reward constraints apply.
    pub async fn rank(
        &self,
        query: &str,
        candidates: &[String],
        constraints: Option<&[Vec<bool>]>,
    ) -> KernelResult<Vec<(usize, ScoreBreakdown)>> {
        let query_embedding = self.embedder.embed(query).await?;

        let mut similarities = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let embedding = self.embedder.embed(candidate).await?;
            let cos = (cosine_similarity(&query_embedding, &embedding) + 1.0) / 2.0;
            similarities.push((i, cos));
        }

        // Pick the top-k by similarity for the expensive rerank stage.
        let mut by_similarity = similarities.clone();
        by_similarity.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top: Vec<usize> = by_similarity.iter().take(self.top_k).map(|(i, _)| *i).collect();

        let mut results = Vec::with_capacity(candidates.len());
        for (i, similarity) in similarities {
            let rerank = if top.contains(&i) {
                token_overlap_f1(query, &candidates[i])
            } else {
                0.0
            };
            let compliance = constraints.and_then(|all| all.get(i)).and_then(|c| {
                if c.is_empty() {
                    None
                } else {
                    Some(c.iter().filter(|ok| **ok).count() as f64 / c.len() as f64)
                }
            });
            let aggregate = aggregate_scores(similarity, rerank, compliance);
            results.push((i, ScoreBreakdown { similarity, rerank, compliance, aggregate }));
        }

        results.sort_by(|a, b| {
            b.1.aggregate.partial_cmp(&a.1.aggregate).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }
}

/// Token-level F1 between query and candidate: the precision stage.
fn token_overlap_f1(query: &str, candidate: &str) -> f64 {
    let query_tokens: Vec<String> =
        query.to_lowercase().split_whitespace().map(String::from).collect();
    let candidate_tokens: Vec<String> =
        candidate.to_lowercase().split_whitespace().map(String::from).collect();
    if query_tokens.is_empty() || candidate_tokens.is_empty() {
        return 0.0;
    }

    let overlap = candidate_tokens
        .iter()
        .filter(|t| query_tokens.contains(t))
        .count() as f64;
    if overlap == 0.0 {
        return 0.0;
    }
    let precision = overlap / candidate_tokens.len() as f64;
    let recall = overlap / query_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::CacheConfig;
    use crate::domain::ports::embedding::NullEmbedding;
    use crate::services::cache::CacheHierarchy;

    fn scorer() -> HybridScorer {
        HybridScorer::new(Arc::new(CachedEmbedder::new(
            Arc::new(NullEmbedding::default()),
            Arc::new(CacheHierarchy::new(&CacheConfig::default())),
        )))
    }

    #[tokio::test]
    async fn exact_match_outranks_unrelated() {
        let scorer = scorer();
        let candidates = vec![
            "quarterly revenue report for the board".to_string(),
            "completely unrelated cooking recipe".to_string(),
        ];
        let ranked = scorer
            .rank("quarterly revenue report", &candidates, None)
            .await
            .unwrap();
        assert_eq!(ranked[0].0, 0);
        assert!(ranked[0].1.aggregate > ranked[1].1.aggregate);
    }

    #[tokio::test]
    async fn constraints_change_the_fusion_weights() {
        let scorer = scorer();
        let with = scorer
            .score("find logs", "find logs quickly", &[true, false])
            .await
            .unwrap();
        assert_eq!(with.compliance, Some(0.5));

        let without = scorer.score("find logs", "find logs quickly", &[]).await.unwrap();
        assert!(without.compliance.is_none());
    }

    #[test]
    fn aggregate_is_clamped() {
        assert!(aggregate_scores(1.0, 1.0, Some(1.0)) <= 1.0);
        assert_eq!(aggregate_scores(0.0, 0.0, None), 0.0);
    }

    #[test]
    fn f1_rewards_overlap() {
        assert!(token_overlap_f1("a b c", "a b c") > 0.99);
        assert_eq!(token_overlap_f1("a b c", "x y z"), 0.0);
    }
}
