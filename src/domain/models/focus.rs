//! Focus items: bounded units of working-memory attention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The attention category of a focus item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusKind {
    Fact,
    Question,
    Hypothesis,
    Decision,
    Task,
}

impl FocusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Question => "question",
            Self::Hypothesis => "hypothesis",
            Self::Decision => "decision",
            Self::Task => "task",
        }
    }
}

/// One unit of short-term attention held in working memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusItem {
    pub id: Uuid,
    pub kind: FocusKind,
    pub content: String,
    /// Eviction priority; lower evicts first.
    pub priority: u8,
    /// Only hypotheses carry a confidence, in `[0.0, 1.0]`.
    pub confidence: Option<f64>,
    pub inserted_at: DateTime<Utc>,
}

impl FocusItem {
    pub fn new(kind: FocusKind, content: impl Into<String>, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content: content.into(),
            priority,
            confidence: if kind == FocusKind::Hypothesis { Some(0.5) } else { None },
            inserted_at: Utc::now(),
        }
    }

    pub fn hypothesis(content: impl Into<String>, priority: u8, confidence: f64) -> Self {
        Self {
            confidence: Some(confidence.clamp(0.0, 1.0)),
            ..Self::new(FocusKind::Hypothesis, content, priority)
        }
    }

    /// Strengthen a hypothesis. Confidence moves up only, never past 1.0.
    pub fn support(&mut self, delta: f64) {
        if let Some(c) = self.confidence {
            self.confidence = Some((c + delta.max(0.0)).min(1.0));
        }
    }

    /// Weaken a hypothesis. Confidence moves down only, never below 0.0.
    pub fn weaken(&mut self, delta: f64) {
        if let Some(c) = self.confidence {
            self.confidence = Some((c - delta.max(0.0)).max(0.0));
        }
    }
}
