//! Entity recognition, intent/sentiment/urgency scoring, and
//! spatiotemporal anchoring (T1).
//!
//! All primitives here are deterministic text transforms: tokenize,
//! generate candidate spans, match against the expected schema, and
//! discard what does not fit.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::context::{EntityRecord, EntityType, GeoAnchor, TimeRange};

// ============================================================================
// Entity extraction
// ============================================================================

/// One row of the expected entity schema: a type plus the patterns that
/// admit a candidate span into it.
#[derive(Debug, Clone)]
pub struct EntitySchemaEntry {
    pub entity_type: EntityType,
    pub patterns: Vec<Regex>,
    /// Confidence assigned to spans admitted by this entry.
    pub confidence: f64,
}

/// Schema-driven entity extractor.
pub struct EntityExtractor {
    schema: Vec<EntitySchemaEntry>,
}

impl EntityExtractor {
    pub fn new(schema: Vec<EntitySchemaEntry>) -> Self {
        Self { schema }
    }

    /// The built-in typed schema.
    pub fn with_default_schema() -> Self {
        let entry = |entity_type, patterns: &[&str], confidence| EntitySchemaEntry {
            entity_type,
            patterns: patterns.iter().filter_map(|p| Regex::new(p).ok()).collect(),
            confidence,
        };
        Self::new(vec![
            entry(EntityType::Identifier, &[r"^[A-Z]+[-_]?\d+$", r"^#\d+$"], 0.9),
            entry(
                EntityType::Metric,
                &[r"^\d+(\.\d+)?\s*(%|percent|ms|s|kb|mb|gb|usd|eur)$", r"^\$\d+(\.\d+)?[kmb]?$"],
                0.9,
            ),
            entry(
                EntityType::Temporal,
                &[r"(?i)^(yesterday|today|tomorrow|last (week|month|year)|\d+ (days?|weeks?|months?) ago)$"],
                0.85,
            ),
            entry(
                EntityType::Organization,
                &[r"^[A-Z][A-Za-z]*\s?(Inc|Corp|Ltd|LLC|GmbH|AG)\.?$"],
                0.8,
            ),
            entry(EntityType::Location, &[r"^(?:[A-Z][a-z]+)(?: [A-Z][a-z]+)?$"], 0.5),
            entry(EntityType::Artifact, &[r"^[a-z0-9_./-]+\.[a-z0-9]{1,4}$", r#"^".+"$"#], 0.7),
        ])
    }

    /// Extract typed entities from `text`. Unmatched spans are discarded.
    pub fn extract_entities(&self, text: &str) -> Vec<EntityRecord> {
        let mut records = Vec::new();
        let mut seen: HashMap<String, ()> = HashMap::new();

        for span in candidate_spans(text) {
            if seen.contains_key(&span) {
                continue;
            }
            for entry in &self.schema {
                if entry.patterns.iter().any(|p| p.is_match(&span)) {
                    seen.insert(span.clone(), ());
                    records.push(EntityRecord {
                        id: Uuid::new_v4(),
                        name: span.trim_matches('"').to_string(),
                        entity_type: entry.entity_type,
                        attributes: serde_json::Value::Null,
                        confidence: entry.confidence,
                    });
                    break;
                }
            }
        }
        records
    }
}

/// Candidate noun-phrase spans: quoted strings, capitalized runs, and
/// individual tokens stripped of closing punctuation.
fn candidate_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();

    // Quoted phrases first.
    let quoted = Regex::new(r#""[^"]+""#).expect("static regex");
    for m in quoted.find_iter(text) {
        spans.push(m.as_str().to_string());
    }

    // Runs of capitalized words ("New York", "Acme Corp").
    let caps = Regex::new(r"\b[A-Z][A-Za-z]*(?: [A-Z][A-Za-z]*)*\b").expect("static regex");
    for m in caps.find_iter(text) {
        spans.push(m.as_str().to_string());
    }

    // Multi-word temporal phrases.
    let temporal = Regex::new(r"(?i)\b(last (?:week|month|year)|\d+ (?:days?|weeks?|months?) ago)\b")
        .expect("static regex");
    for m in temporal.find_iter(text) {
        spans.push(m.as_str().to_string());
    }

    // Plain tokens, stripped of punctuation and quoting.
    for token in text.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| ",.;:!?()`\"'".contains(c));
        if !trimmed.is_empty() {
            spans.push(trimmed.to_string());
        }
    }
    spans
}

// ============================================================================
// Intent / sentiment / urgency
// ============================================================================

/// Output of the three scoring primitives, each normalized to `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveScores {
    pub intent: (String, f64),
    pub sentiment: f64,
    pub urgency: f64,
}

/// The scoring primitives. Stateless; all methods are pure.
pub struct ScoringPrimitives;

impl ScoringPrimitives {
    /// Run all three scorers concurrently over the same text.
    pub async fn score_all(text: &str) -> PrimitiveScores {
        let (intent, sentiment, urgency) = futures::join!(
            async { Self::detect_intent(text) },
            async { Self::analyze_sentiment(text) },
            async { Self::score_urgency(text) },
        );
        PrimitiveScores { intent, sentiment, urgency }
    }

    /// Coarse intent: `act`, `query`, or `inform`, with a strength score.
    pub fn detect_intent(text: &str) -> (String, f64) {
        let lower = text.to_lowercase();
        let act_terms = ["run", "execute", "delete", "create", "deploy", "fix", "reboot", "restart", "poll", "report", "label", "find", "fetch", "stop"];
        let query_terms = ["what", "why", "how", "when", "where", "who", "which", "?"];

        let act_hits = act_terms.iter().filter(|t| lower.contains(*t)).count();
        let query_hits = query_terms.iter().filter(|t| lower.contains(*t)).count();

        if act_hits >= query_hits && act_hits > 0 {
            ("act".to_string(), (0.5 + 0.2 * act_hits as f64).min(1.0))
        } else if query_hits > 0 {
            ("query".to_string(), (0.5 + 0.2 * query_hits as f64).min(1.0))
        } else {
            ("inform".to_string(), 0.5)
        }
    }

    /// Lexicon sentiment: 0.0 most negative, 0.5 neutral, 1.0 most positive.
    pub fn analyze_sentiment(text: &str) -> f64 {
        let lower = text.to_lowercase();
        let positive = ["good", "great", "success", "succeeded", "improved", "up", "gain", "resolved", "healthy"];
        let negative = ["bad", "fail", "failed", "error", "down", "loss", "broken", "crash", "outage", "degraded"];

        let pos = positive.iter().filter(|t| lower.contains(*t)).count() as f64;
        let neg = negative.iter().filter(|t| lower.contains(*t)).count() as f64;
        if pos + neg == 0.0 {
            return 0.5;
        }
        (0.5 + 0.5 * (pos - neg) / (pos + neg)).clamp(0.0, 1.0)
    }

    /// Urgency from strong/moderate markers plus punctuation emphasis.
    pub fn score_urgency(text: &str) -> f64 {
        let lower = text.to_lowercase();
        let strong = ["urgent", "emergency", "critical", "asap", "immediately"];
        let moderate = ["now", "required", "must", "deadline", "overdue", "right away"];

        let mut score = 0.0;
        score += 0.6 * strong.iter().filter(|t| lower.contains(*t)).count() as f64;
        score += 0.25 * moderate.iter().filter(|t| lower.contains(*t)).count() as f64;
        if text.contains('!') {
            score += 0.1;
        }
        score.min(1.0)
    }
}

// ============================================================================
// Spatiotemporal anchor
// ============================================================================

/// Resolves relative expressions against a supplied clock and an
/// optional geographic gazetteer.
pub struct SpatioTemporalAnchor {
    gazetteer: HashMap<String, (f64, f64)>,
}

impl SpatioTemporalAnchor {
    pub fn new(gazetteer: HashMap<String, (f64, f64)>) -> Self {
        Self { gazetteer }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Resolve time and place references in `text`.
    ///
    /// `financial_context` adapts ambiguity: "last week" then means the
    /// last closed business week (Monday through Friday).
    pub fn anchor(
        &self,
        text: &str,
        now: DateTime<Utc>,
        financial_context: bool,
    ) -> (Option<TimeRange>, Option<GeoAnchor>) {
        (self.resolve_time(text, now, financial_context), self.resolve_place(text))
    }

    fn resolve_time(
        &self,
        text: &str,
        now: DateTime<Utc>,
        financial_context: bool,
    ) -> Option<TimeRange> {
        let lower = text.to_lowercase();
        let midnight = |d: chrono::NaiveDate| {
            d.and_time(NaiveTime::MIN).and_utc()
        };
        let today = now.date_naive();

        if lower.contains("yesterday") {
            let start = midnight(today - Duration::days(1));
            return Some(TimeRange { start, end: midnight(today) });
        }
        if lower.contains("today") {
            return Some(TimeRange { start: midnight(today), end: midnight(today + Duration::days(1)) });
        }
        if lower.contains("last week") {
            let days_into_week = i64::from(today.weekday().num_days_from_monday());
            let this_monday = today - Duration::days(days_into_week);
            let last_monday = this_monday - Duration::days(7);
            let end = if financial_context {
                // Last closed business week: Monday through Friday close.
                midnight(last_monday + Duration::days(5))
            } else {
                midnight(this_monday)
            };
            return Some(TimeRange { start: midnight(last_monday), end });
        }
        if lower.contains("last month") {
            let first_of_this = today.with_day(1)?;
            let last_month_end = first_of_this;
            let first_of_last = (first_of_this - Duration::days(1)).with_day(1)?;
            return Some(TimeRange { start: midnight(first_of_last), end: midnight(last_month_end) });
        }
        if let Some(caps) = Regex::new(r"(?i)(\d+) days? ago").ok()?.captures(&lower) {
            let days: i64 = caps.get(1)?.as_str().parse().ok()?;
            let day = today - Duration::days(days);
            return Some(TimeRange { start: midnight(day), end: midnight(day + Duration::days(1)) });
        }
        None
    }

    fn resolve_place(&self, text: &str) -> Option<GeoAnchor> {
        let lower = text.to_lowercase();
        self.gazetteer.iter().find_map(|(place, &(latitude, longitude))| {
            lower
                .contains(&place.to_lowercase())
                .then(|| GeoAnchor { place: place.clone(), latitude, longitude })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identifiers_and_metrics_extract() {
        let extractor = EntityExtractor::with_default_schema();
        let records = extractor.extract_entities("poll job J123 until usage drops below 85%");

        let types: Vec<_> = records.iter().map(|r| (r.name.as_str(), r.entity_type)).collect();
        assert!(types.contains(&("J123", EntityType::Identifier)));
        assert!(types.contains(&("85%", EntityType::Metric)));
    }

    #[test]
    fn unmatched_spans_are_discarded() {
        let extractor = EntityExtractor::with_default_schema();
        let records = extractor.extract_entities("the and with from");
        assert!(records.is_empty());
    }

    #[test]
    fn file_names_extract_as_artifacts() {
        let extractor = EntityExtractor::with_default_schema();
        let records = extractor.extract_entities("archive server.log before midnight");
        assert!(records
            .iter()
            .any(|r| r.name == "server.log" && r.entity_type == EntityType::Artifact));
    }

    #[tokio::test]
    async fn scorers_run_from_the_same_text() {
        let scores = ScoringPrimitives::score_all("urgent reboot required").await;
        assert_eq!(scores.intent.0, "act");
        assert!(scores.urgency >= 0.8);
        assert!((0.0..=1.0).contains(&scores.sentiment));
    }

    #[test]
    fn urgency_of_calm_text_is_low() {
        assert!(ScoringPrimitives::score_urgency("summarize the notes sometime") < 0.2);
    }

    #[test]
    fn sentiment_detects_polarity() {
        assert!(ScoringPrimitives::analyze_sentiment("great success, fully resolved") > 0.5);
        assert!(ScoringPrimitives::analyze_sentiment("outage and errors everywhere") < 0.5);
        assert_eq!(ScoringPrimitives::analyze_sentiment("the sky is blue"), 0.5);
    }

    #[test]
    fn last_week_resolves_to_business_week_in_financial_context() {
        let anchor = SpatioTemporalAnchor::empty();
        // A Wednesday.
        let now = Utc.with_ymd_and_hms(2024, 7, 17, 15, 0, 0).unwrap();
        let (range, _) = anchor.anchor("revenue for last week", now, true);
        let range = range.unwrap();

        // Monday 2024-07-08 00:00 through Saturday 2024-07-13 00:00.
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 7, 8, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 7, 13, 0, 0, 0).unwrap());
    }

    #[test]
    fn last_week_is_calendar_week_otherwise() {
        let anchor = SpatioTemporalAnchor::empty();
        let now = Utc.with_ymd_and_hms(2024, 7, 17, 15, 0, 0).unwrap();
        let (range, _) = anchor.anchor("photos from last week", now, false);
        let range = range.unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 7, 8, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn yesterday_resolves_to_one_day() {
        let anchor = SpatioTemporalAnchor::empty();
        let now = Utc.with_ymd_and_hms(2024, 7, 17, 15, 0, 0).unwrap();
        let (range, _) = anchor.anchor("logs from yesterday", now, false);
        let range = range.unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 7, 16, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 7, 17, 0, 0, 0).unwrap());
    }

    #[test]
    fn gazetteer_resolves_places() {
        let mut gazetteer = HashMap::new();
        gazetteer.insert("Berlin".to_string(), (52.52, 13.405));
        let anchor = SpatioTemporalAnchor::new(gazetteer);
        let (_, geo) = anchor.anchor("weather in berlin tomorrow", Utc::now(), false);
        let geo = geo.unwrap();
        assert_eq!(geo.place, "Berlin");
        assert!((geo.latitude - 52.52).abs() < 1e-9);
    }
}
