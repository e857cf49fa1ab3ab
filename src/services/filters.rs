//! Attention and plausibility filters (T2).
//!
//! Stage one masks context elements whose relevance to the active goal
//! falls below the configured threshold, yielding a focused context.
//! Stage two checks the focused goal for logical coherence:
//! contradictory constraints, impossible requirements, and hallucination
//! indicators.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::models::config::PlanningConfig;
use crate::domain::models::world::WorldSnapshot;

use super::extract::EntityExtractor;

/// Antonym pairs that signal a contradictory goal when both sides touch
/// the same object.
const CONTRADICTION_PAIRS: &[(&[&str], &[&str])] = &[
    (
        &["delete", "remove", "purge", "drop", "erase"],
        &["preserve", "keep", "retain", "backup", "save"],
    ),
    (&["start", "launch", "enable"], &["stop", "halt", "disable"]),
    (&["increase", "raise", "grow"], &["decrease", "reduce", "shrink"]),
];

/// The goal plus the context slices that survived the attention mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinedState {
    pub goal: String,
    pub retained: Vec<String>,
    pub masked_count: usize,
}

/// A coherence failure: the goal should not be planned as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanityAlert {
    pub findings: Vec<String>,
}

/// Outcome of the combined filter pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterOutcome {
    Refined(RefinedState),
    Alert(SanityAlert),
}

/// The T2 attention + plausibility filters.
pub struct CognitiveFilters {
    config: PlanningConfig,
    extractor: EntityExtractor,
}

impl CognitiveFilters {
    pub fn new(config: PlanningConfig) -> Self {
        Self { config, extractor: EntityExtractor::with_default_schema() }
    }

    /// Run the attention mask, then the plausibility check.
    pub fn run_cognitive_filters(
        &self,
        snapshot: &WorldSnapshot,
        context_elements: &[String],
    ) -> FilterOutcome {
        let goal = snapshot.objective.text.clone();

        // Stage 1: semantic-relevance mask.
        let mut retained = Vec::new();
        let mut masked = 0usize;
        for element in context_elements {
            if relevance(&goal, element) >= self.config.relevance_threshold {
                retained.push(element.clone());
            } else {
                masked += 1;
            }
        }

        // Stage 2: coherence over the focused goal.
        let findings = self.coherence_findings(&goal, snapshot);
        if findings.is_empty() {
            FilterOutcome::Refined(RefinedState { goal, retained, masked_count: masked })
        } else {
            FilterOutcome::Alert(SanityAlert { findings })
        }
    }

    fn coherence_findings(&self, goal: &str, snapshot: &WorldSnapshot) -> Vec<String> {
        let mut findings = Vec::new();
        let lower = goal.to_lowercase();

        // Contradictory constraints on a shared object.
        for (left, right) in CONTRADICTION_PAIRS {
            let l = left.iter().find(|t| lower.contains(*t));
            let r = right.iter().find(|t| lower.contains(*t));
            if let (Some(l), Some(r)) = (l, r) {
                if let Some(object) = shared_object(&lower, l, r) {
                    findings.push(format!(
                        "contradictory constraints: `{l}` and `{r}` both target `{object}`"
                    ));
                }
            }
        }

        // Impossible physical requirements.
        if Regex::new(r"(?i)\b(-\d+|negative)\s+(files?|items?|bytes?|seconds?|days?)\b")
            .map(|p| p.is_match(goal))
            .unwrap_or(false)
        {
            findings.push("impossible requirement: negative quantity".to_string());
        }
        if Regex::new(r"(?i)before\s+it\s+(was|is)\s+created")
            .map(|p| p.is_match(goal))
            .unwrap_or(false)
        {
            findings.push("impossible requirement: effect precedes cause".to_string());
        }

        // Hallucination indicator: a backtick-referenced entity the
        // extractor cannot find and the world does not know.
        let referenced = Regex::new(r"`([^`]+)`")
            .map(|p| {
                p.captures_iter(goal)
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !referenced.is_empty() {
            let extracted: Vec<String> = self
                .extractor
                .extract_entities(goal)
                .into_iter()
                .map(|e| e.name.to_lowercase())
                .collect();
            let known = snapshot.known_entity_names();
            for name in referenced {
                let lower_name = name.to_lowercase();
                let seen = extracted.iter().any(|e| lower_name.contains(e.as_str()))
                    || known.contains(&lower_name);
                if !seen {
                    findings.push(format!("referenced entity `{name}` is absent from the extracted entity set"));
                }
            }
        }

        findings
    }
}

/// Token-overlap relevance of a context element to the goal.
fn relevance(goal: &str, element: &str) -> f64 {
    let goal_tokens: Vec<String> =
        goal.to_lowercase().split_whitespace().map(String::from).collect();
    let element_tokens: Vec<String> =
        element.to_lowercase().split_whitespace().map(String::from).collect();
    if goal_tokens.is_empty() || element_tokens.is_empty() {
        return 0.0;
    }
    let overlap = element_tokens.iter().filter(|t| goal_tokens.contains(t)).count() as f64;
    overlap / element_tokens.len() as f64
}

/// A noun both verbs plausibly act on: the nearest shared content word.
fn shared_object(goal: &str, left_verb: &str, right_verb: &str) -> Option<String> {
    let stop = ["the", "all", "a", "an", "of", "to", "and", "also", "than", "from", "matching"];
    let tokens: Vec<&str> = goal.split_whitespace().collect();

    let after = |verb: &str| -> Vec<String> {
        tokens
            .iter()
            .skip_while(|t| !t.starts_with(verb))
            .skip(1)
            .filter(|t| !stop.contains(&t.trim_matches(|c: char| !c.is_alphanumeric())))
            .take(4)
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric())
                    .trim_end_matches('s')
                    .to_string()
            })
            .filter(|t| t.len() > 2)
            .collect()
    };

    let left_objects = after(left_verb);
    let right_objects = after(right_verb);
    left_objects.into_iter().find(|o| right_objects.contains(o))
}
