//! Epoch summaries: the sole artifact written to the Vault on epoch close.
//!
//! Summaries serialize with deterministic field ordering (struct order plus
//! sorted maps) so a content hash over the bytes is stable across runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::budget::BudgetAmounts;
use super::context::EntityRecord;
use super::ids::{AgentId, DagId, EpochId, EventId};
use super::outcome::ReflectionInsight;

/// A compressed record of one observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizedEvent {
    pub event_id: EventId,
    pub received_at: DateTime<Utc>,
    /// Event type discriminator, e.g. `"tool_completed"`.
    pub kind: String,
    pub digest: String,
}

/// Final disposition of one DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagOutcome {
    pub dag_id: DagId,
    pub succeeded: bool,
    pub nodes_total: usize,
    pub nodes_succeeded: usize,
    pub nodes_failed: usize,
    pub nodes_skipped: usize,
    /// Payload of the terminal node when the DAG succeeded.
    pub final_payload: Option<serde_json::Value>,
}

/// A commit-worthy decision taken during the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decided_at: DateTime<Utc>,
    pub subject: String,
    pub decision: String,
}

/// One entry in the append-only causality journal.
///
/// Entries reference working-memory ids, never each other's structures,
/// so the cause graph stays an explicit acyclic id graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: EventId,
    /// Ids of earlier entries this one follows from. Always earlier ids.
    #[serde(default)]
    pub caused_by: Vec<EventId>,
    pub recorded_at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

/// The serialized output of `flush_to_summarizer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch_id: EpochId,
    pub agent_id: AgentId,
    pub objective: String,
    pub closed_at: DateTime<Utc>,
    pub events: Vec<SummarizedEvent>,
    pub completed_dags: Vec<DagOutcome>,
    pub decisions: Vec<DecisionRecord>,
    /// Final entity set, keyed by entity name for deterministic ordering.
    pub entities: BTreeMap<String, EntityRecord>,
    pub insights: Vec<ReflectionInsight>,
    pub journal: Vec<JournalEntry>,
    pub budget_spent: BudgetAmounts,
    /// Set when the epoch closed because the budget hard threshold tripped.
    /// This is the durable signal that further work needs a new grant.
    pub budget_exhausted: bool,
}

impl EpochSummary {
    pub fn empty(agent_id: AgentId, objective: impl Into<String>) -> Self {
        Self {
            epoch_id: EpochId::new(),
            agent_id,
            objective: objective.into(),
            closed_at: Utc::now(),
            events: Vec::new(),
            completed_dags: Vec::new(),
            decisions: Vec::new(),
            entities: BTreeMap::new(),
            insights: Vec::new(),
            journal: Vec::new(),
            budget_spent: BudgetAmounts::default(),
            budget_exhausted: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.completed_dags.is_empty()
            && self.decisions.is_empty()
            && self.entities.is_empty()
            && self.insights.is_empty()
            && self.journal.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_reports_empty() {
        let summary = EpochSummary::empty(AgentId::new(), "noop");
        assert!(summary.is_empty());
        assert!(!summary.budget_exhausted);
    }

    #[test]
    fn entity_map_orders_by_name() {
        let mut summary = EpochSummary::empty(AgentId::new(), "order check");
        for name in ["zeta", "alpha", "mid"] {
            summary.entities.insert(
                name.to_string(),
                EntityRecord {
                    id: uuid::Uuid::new_v4(),
                    name: name.to_string(),
                    entity_type: crate::domain::models::context::EntityType::Artifact,
                    attributes: serde_json::Value::Null,
                    confidence: 1.0,
                },
            );
        }
        let names: Vec<_> = summary.entities.keys().cloned().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
