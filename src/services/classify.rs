//! Three-layer fusion classifier (T1).
//!
//! Layer A scores linguistic evidence from regex and keyword features.
//! Layer B scores semantic proximity as cosine similarity to
//! profile-defined class centroids. Layer C merges both with configured
//! weights against a confidence threshold. Results are cycle-scoped:
//! identical input within one L1 window returns the cached result.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::config::PlanningConfig;
use crate::infrastructure::hashing::generate_cache_key;

use super::cache::{CacheDataKind, CacheHierarchy};
use super::embedder::{cosine_similarity, CachedEmbedder};

const LINGUISTIC_WEIGHT: f64 = 0.55;
const SEMANTIC_WEIGHT: f64 = 0.45;

/// One class the classifier knows about.
#[derive(Debug, Clone)]
pub struct ClassProfile {
    pub label: String,
    /// Linguistic-layer features.
    pub patterns: Vec<Regex>,
    pub keywords: Vec<String>,
    /// Prose description embedded once to form the class centroid.
    pub description: String,
}

impl ClassProfile {
    pub fn new(
        label: impl Into<String>,
        patterns: &[&str],
        keywords: &[&str],
        description: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            patterns: patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            keywords: keywords.iter().map(|k| (*k).to_lowercase()).collect(),
            description: description.into(),
        }
    }

    /// Built-in profile set used when the agent profile supplies none.
    pub fn default_set() -> Vec<ClassProfile> {
        vec![
            ClassProfile::new(
                "imperative/urgent",
                &[
                    r"(?i)\b(urgent|immediately|asap|critical|emergency|right now)\b",
                    r"(?i)^(reboot|restart|stop|start|run|fix|deploy|update|check|escalate|restore)\b",
                    r"(?i)\b(required|must|needs? to)\b",
                ],
                &["urgent", "immediately", "asap", "critical", "emergency", "required", "now"],
                "a command or demand that must be acted on without delay",
            ),
            ClassProfile::new(
                "question",
                &[r"\?\s*$", r"(?i)^(what|why|how|when|where|who|which|is|are|does|can|could|should)\b"],
                &["what", "why", "how", "when", "where", "who"],
                "an information-seeking question expecting an answer",
            ),
            ClassProfile::new(
                "request/polite",
                &[r"(?i)\b(please|kindly|could you|would you|can you)\b"],
                &["please", "kindly"],
                "a polite request for assistance or action",
            ),
            ClassProfile::new(
                "statement",
                &[r"(?i)\b(reported|observed|noted|completed|confirmed)\b"],
                &["report", "observed", "noted", "fyi"],
                "a declarative statement conveying information",
            ),
        ]
    }

    fn linguistic_score(&self, text: &str) -> f64 {
        if self.patterns.is_empty() && self.keywords.is_empty() {
            return 0.0;
        }
        let lower = text.to_lowercase();
        let pattern_hits = self.patterns.iter().filter(|p| p.is_match(text)).count();
        let keyword_hits = self.keywords.iter().filter(|k| lower.contains(k.as_str())).count();

        let pattern_score = if self.patterns.is_empty() {
            0.0
        } else {
            pattern_hits as f64 / self.patterns.len() as f64
        };
        let keyword_score = if self.keywords.is_empty() {
            0.0
        } else {
            (keyword_hits as f64 / self.keywords.len() as f64).min(1.0)
        };
        (0.7 * pattern_score + 0.3 * keyword_score).min(1.0)
    }
}

/// A successful classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f64,
    /// Per-class fused probabilities, highest first.
    pub probabilities: Vec<(String, f64)>,
    /// Per-class linguistic-layer evidence, used for tie-breaks.
    pub linguistic: Vec<(String, f64)>,
}

/// Classified, or a signal that no known class fits well enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifierOutcome {
    Classified(ClassificationResult),
    /// The input does not fit any known class with sufficient confidence.
    Fallback { best_label: Option<String>, best_confidence: f64 },
}

impl ClassifierOutcome {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Classified(result) => Some(&result.label),
            Self::Fallback { .. } => None,
        }
    }
}

/// The T1 classifier.
pub struct Classifier {
    profiles: Vec<ClassProfile>,
    config: PlanningConfig,
    embedder: Arc<CachedEmbedder>,
    cache: Arc<CacheHierarchy>,
    centroids: RwLock<HashMap<String, Vec<f32>>>,
}

impl Classifier {
    pub fn new(
        profiles: Vec<ClassProfile>,
        config: PlanningConfig,
        embedder: Arc<CachedEmbedder>,
        cache: Arc<CacheHierarchy>,
    ) -> Self {
        Self {
            profiles,
            config,
            embedder,
            cache,
            centroids: RwLock::new(HashMap::new()),
        }
    }

    /// Classify `text` into one of the known classes.
    pub async fn classify(&self, text: &str) -> ClassifierOutcome {
        let key = generate_cache_key("classify", &json!({ "text": text }));
        if let Some(cached) = self.cache.read_cache(&key, None).await {
            if let Ok(outcome) = serde_json::from_value::<ClassifierOutcome>(cached) {
                return outcome;
            }
        }

        let outcome = self.classify_uncached(text).await;
        if let Ok(value) = serde_json::to_value(&outcome) {
            self.cache.write_cache(key, value, CacheDataKind::Classification).await;
        }
        outcome
    }

    async fn classify_uncached(&self, text: &str) -> ClassifierOutcome {
        let input_embedding = self.embedder.embed(text).await.ok();

        let mut linguistic = Vec::with_capacity(self.profiles.len());
        let mut fused = Vec::with_capacity(self.profiles.len());

        for profile in &self.profiles {
            let ling = profile.linguistic_score(text);
            let sem = match &input_embedding {
                Some(vector) => {
                    let centroid = self.centroid(profile).await;
                    // Map cosine from [-1, 1] into [0, 1].
                    centroid.map_or(0.0, |c| (cosine_similarity(vector, &c) + 1.0) / 2.0)
                }
                None => 0.0,
            };
            let score = LINGUISTIC_WEIGHT * ling + SEMANTIC_WEIGHT * sem;
            linguistic.push((profile.label.clone(), ling));
            fused.push((profile.label.clone(), score));
        }

        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let Some((best_label, best_score)) = fused.first().cloned() else {
            return ClassifierOutcome::Fallback { best_label: None, best_confidence: 0.0 };
        };

        if best_score < self.config.confidence_threshold {
            debug!(best_label, best_score, "classification below confidence threshold");
            return ClassifierOutcome::Fallback {
                best_label: Some(best_label),
                best_confidence: best_score,
            };
        }

        // Tie-break within epsilon: prefer stronger linguistic evidence.
        if let Some((second_label, second_score)) = fused.get(1).cloned() {
            if (best_score - second_score).abs() <= self.config.tie_epsilon {
                let ling_of = |label: &str| {
                    linguistic
                        .iter()
                        .find(|(l, _)| l == label)
                        .map_or(0.0, |(_, s)| *s)
                };
                let best_ling = ling_of(&best_label);
                let second_ling = ling_of(&second_label);
                if (best_ling - second_ling).abs() <= f64::EPSILON {
                    return ClassifierOutcome::Fallback {
                        best_label: Some(best_label),
                        best_confidence: best_score,
                    };
                }
                if second_ling > best_ling {
                    return self.build_result(second_label, second_score, fused, linguistic);
                }
            }
        }

        self.build_result(best_label, best_score, fused, linguistic)
    }

    fn build_result(
        &self,
        label: String,
        confidence: f64,
        probabilities: Vec<(String, f64)>,
        linguistic: Vec<(String, f64)>,
    ) -> ClassifierOutcome {
        ClassifierOutcome::Classified(ClassificationResult {
            label,
            confidence,
            probabilities,
            linguistic,
        })
    }

    async fn centroid(&self, profile: &ClassProfile) -> Option<Vec<f32>> {
        {
            let centroids = self.centroids.read().await;
            if let Some(c) = centroids.get(&profile.label) {
                return Some(c.clone());
            }
        }
        let vector = self.embedder.embed(&profile.description).await.ok()?;
        self.centroids.write().await.insert(profile.label.clone(), vector.clone());
        Some(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::CacheConfig;
    use crate::domain::ports::embedding::NullEmbedding;
    use crate::services::cache::CacheLevel;

    fn classifier() -> Classifier {
        let cache = Arc::new(CacheHierarchy::new(&CacheConfig::default()));
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(NullEmbedding::default()),
            Arc::clone(&cache),
        ));
        Classifier::new(
            ClassProfile::default_set(),
            PlanningConfig::default(),
            embedder,
            cache,
        )
    }

    #[tokio::test]
    async fn urgent_command_classifies_as_imperative() {
        let outcome = classifier().classify("urgent reboot required").await;
        assert_eq!(outcome.label(), Some("imperative/urgent"));
    }

    #[tokio::test]
    async fn question_classifies_as_question() {
        let outcome = classifier().classify("what is the current disk usage?").await;
        assert_eq!(outcome.label(), Some("question"));
    }

    #[tokio::test]
    async fn gibberish_triggers_fallback() {
        let mut config = PlanningConfig::default();
        config.confidence_threshold = 0.9;
        let cache = Arc::new(CacheHierarchy::new(&CacheConfig::default()));
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(NullEmbedding::default()),
            Arc::clone(&cache),
        ));
        let classifier =
            Classifier::new(ClassProfile::default_set(), config, embedder, cache);

        let outcome = classifier.classify("zzz qqq xxyzzy").await;
        assert!(matches!(outcome, ClassifierOutcome::Fallback { .. }));
    }

    #[tokio::test]
    async fn repeat_classification_hits_l1() {
        let classifier = classifier();
        let key = generate_cache_key("classify", &json!({ "text": "urgent reboot required" }));

        classifier.classify("urgent reboot required").await;
        classifier.classify("urgent reboot required").await;
        assert_eq!(classifier.cache.entry_hits(&key, CacheLevel::L1).await, Some(1));
    }

    #[tokio::test]
    async fn cycle_boundary_invalidates_cached_classification() {
        let classifier = classifier();
        let key = generate_cache_key("classify", &json!({ "text": "urgent reboot required" }));

        classifier.classify("urgent reboot required").await;
        classifier.cache.begin_cycle().await;
        classifier.classify("urgent reboot required").await;
        // Fresh entry after the L1 flush: no hits yet.
        assert_eq!(classifier.cache.entry_hits(&key, CacheLevel::L1).await, Some(0));
    }
}
