//! Short-term working memory (T4).
//!
//! Exclusively owned by one OODA instance. Holds the focus set (capped
//! at the configured focus cap), the bounded event history, a TTL'd
//! entity cache, per-DAG status tables, and the epoch accumulators
//! (decisions, insights, journal). `flush_to_summarizer` produces the
//! epoch summary and clears state under one exclusive lock, so no
//! observation is ever lost or duplicated between the summary and the
//! cleared buffer.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::budget::BudgetAmounts;
use crate::domain::models::config::MemoryConfig;
use crate::domain::models::context::EntityRecord;
use crate::domain::models::dag::NodeStatus;
use crate::domain::models::epoch::{
    DagOutcome, DecisionRecord, EpochSummary, JournalEntry, SummarizedEvent,
};
use crate::domain::models::event::{Observation, ObservationPayload};
use crate::domain::models::focus::FocusItem;
use crate::domain::models::ids::{AgentId, DagId, EventId, NodeId};
use crate::domain::models::outcome::ReflectionInsight;
use crate::infrastructure::hashing::generate_cache_key;

/// Snapshot of one DAG's status table.
pub type DagStateSnapshot = HashMap<NodeId, NodeStatus>;

struct MemoryInner {
    focus: HashMap<Uuid, FocusItem>,
    events: VecDeque<Observation>,
    entity_cache: HashMap<String, (EntityRecord, Instant)>,
    dag_states: HashMap<DagId, DagStateSnapshot>,
    decisions: Vec<DecisionRecord>,
    insights: Vec<ReflectionInsight>,
    completed_dags: Vec<DagOutcome>,
    journal: Vec<JournalEntry>,
}

impl MemoryInner {
    fn empty() -> Self {
        Self {
            focus: HashMap::new(),
            events: VecDeque::new(),
            entity_cache: HashMap::new(),
            dag_states: HashMap::new(),
            decisions: Vec::new(),
            insights: Vec::new(),
            completed_dags: Vec::new(),
            journal: Vec::new(),
        }
    }
}

/// The T4 working memory.
pub struct WorkingMemory {
    agent_id: AgentId,
    objective: String,
    config: MemoryConfig,
    inner: Mutex<MemoryInner>,
}

impl WorkingMemory {
    pub fn new(agent_id: AgentId, objective: impl Into<String>, config: MemoryConfig) -> Self {
        Self {
            agent_id,
            objective: objective.into(),
            config,
            inner: Mutex::new(MemoryInner::empty()),
        }
    }

    // -------------------------------------------------------------------------
    // DAG state
    // -------------------------------------------------------------------------

    /// Mutate one node's status in place and return the DAG's snapshot.
    pub async fn update_dag_state(
        &self,
        dag_id: DagId,
        node_id: NodeId,
        status: NodeStatus,
    ) -> DagStateSnapshot {
        let mut inner = self.inner.lock().await;
        let table = inner.dag_states.entry(dag_id).or_default();
        table.insert(node_id, status);
        table.clone()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Append an observation, evicting the oldest at `max_events`.
    /// Evicted events are logged but not retained in memory.
    pub async fn push_event(&self, event: Observation) {
        let mut inner = self.inner.lock().await;
        if inner.events.len() == self.config.max_events {
            if let Some(evicted) = inner.events.pop_front() {
                debug!(event_id = %evicted.id, "event evicted by sliding window");
            }
        }
        inner.events.push_back(event);
    }

    /// The full buffer, or a relevance-filtered slice bounded in bytes.
    pub async fn read_context(&self, query: Option<&str>) -> Vec<Observation> {
        const MAX_SLICE_BYTES: usize = 64 * 1024;

        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        let mut budget = MAX_SLICE_BYTES;
        // Newest first: recent observations matter most under a byte cap.
        for event in inner.events.iter().rev() {
            if let Some(query) = query {
                if !observation_matches(event, query) {
                    continue;
                }
            }
            let size = serde_json::to_vec(event).map(|v| v.len()).unwrap_or(0);
            if size > budget {
                break;
            }
            budget -= size;
            out.push(event.clone());
        }
        out.reverse();
        out
    }

    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }

    // -------------------------------------------------------------------------
    // Entities and focus
    // -------------------------------------------------------------------------

    /// Store a just-extracted entity so the next cycle does not re-derive it.
    pub async fn cache_entity(&self, key: impl Into<String>, value: EntityRecord, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner.entity_cache.insert(key.into(), (value, Instant::now() + ttl));
    }

    pub async fn read_entity(&self, key: &str) -> Option<EntityRecord> {
        let inner = self.inner.lock().await;
        inner.entity_cache.get(key).and_then(|(record, expires)| {
            (Instant::now() < *expires).then(|| record.clone())
        })
    }

    /// Admit a focus item, evicting by lowest priority then oldest when
    /// the cap is reached. The set never exceeds the configured cap.
    pub async fn add_focus(&self, item: FocusItem) {
        let mut inner = self.inner.lock().await;
        if inner.focus.len() >= self.config.focus_cap {
            let victim = inner
                .focus
                .values()
                .min_by(|a, b| {
                    a.priority
                        .cmp(&b.priority)
                        .then(a.inserted_at.cmp(&b.inserted_at))
                })
                .map(|item| item.id);
            if let Some(victim) = victim {
                inner.focus.remove(&victim);
            }
        }
        inner.focus.insert(item.id, item);
    }

    pub async fn focus_len(&self) -> usize {
        self.inner.lock().await.focus.len()
    }

    pub async fn focus_items(&self) -> Vec<FocusItem> {
        self.inner.lock().await.focus.values().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Epoch accumulators
    // -------------------------------------------------------------------------

    pub async fn record_decision(&self, subject: impl Into<String>, decision: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.decisions.push(DecisionRecord {
            decided_at: Utc::now(),
            subject: subject.into(),
            decision: decision.into(),
        });
    }

    pub async fn record_insight(&self, insight: ReflectionInsight) {
        self.inner.lock().await.insights.push(insight);
    }

    pub async fn record_dag_outcome(&self, outcome: DagOutcome) {
        self.inner.lock().await.completed_dags.push(outcome);
    }

    /// Append to the causality journal. `caused_by` must reference
    /// earlier entries only; later ids are dropped to keep the id graph
    /// acyclic.
    pub async fn journal_append(
        &self,
        kind: impl Into<String>,
        detail: impl Into<String>,
        caused_by: Vec<EventId>,
    ) -> EventId {
        let mut inner = self.inner.lock().await;
        let known: Vec<EventId> = inner.journal.iter().map(|e| e.entry_id).collect();
        let entry_id = EventId::new();
        inner.journal.push(JournalEntry {
            entry_id,
            caused_by: caused_by.into_iter().filter(|id| known.contains(id)).collect(),
            recorded_at: Utc::now(),
            kind: kind.into(),
            detail: detail.into(),
        });
        entry_id
    }

    // -------------------------------------------------------------------------
    // Flush and GC
    // -------------------------------------------------------------------------

    /// Produce the epoch summary and clear state atomically.
    ///
    /// The exclusive lock is held across both the production and the
    /// clear, so an immediate re-flush returns an empty summary.
    pub async fn flush_to_summarizer(
        &self,
        budget_spent: BudgetAmounts,
        budget_exhausted: bool,
    ) -> EpochSummary {
        let mut inner = self.inner.lock().await;
        let drained = std::mem::replace(&mut *inner, MemoryInner::empty());

        let events = drained.events.iter().map(summarize_event).collect();
        let entities: BTreeMap<String, EntityRecord> = drained
            .entity_cache
            .into_values()
            .map(|(record, _)| (record.name.clone(), record))
            .collect();

        EpochSummary {
            epoch_id: crate::domain::models::ids::EpochId::new(),
            agent_id: self.agent_id,
            objective: self.objective.clone(),
            closed_at: Utc::now(),
            events,
            completed_dags: drained.completed_dags,
            decisions: drained.decisions,
            entities,
            insights: drained.insights,
            journal: drained.journal,
            budget_spent,
            budget_exhausted,
        }
    }

    /// Periodic GC for the entity cache and stale focus items.
    pub async fn evict_stale_entries(&self, max_age: Duration) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.entity_cache.retain(|_, (_, expires)| now < *expires);

        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        inner.focus.retain(|_, item| item.inserted_at > cutoff || item.priority > 5);
    }
}

fn observation_matches(event: &Observation, query: &str) -> bool {
    let haystack = serde_json::to_string(&event.payload).unwrap_or_default().to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .any(|token| haystack.contains(token))
}

fn summarize_event(event: &Observation) -> SummarizedEvent {
    let kind = match &event.payload {
        ObservationPayload::ToolCompleted { .. } => "tool_completed",
        ObservationPayload::ToolParked { .. } => "tool_parked",
        ObservationPayload::UserMessage { .. } => "user_message",
        ObservationPayload::TimerWake { .. } => "timer_wake",
        ObservationPayload::WebhookArrived { .. } => "webhook_arrived",
        ObservationPayload::HealthProbe { .. } => "health_probe",
    };
    let digest = generate_cache_key(
        "event_digest",
        &json!({ "payload": serde_json::to_value(&event.payload).unwrap_or_default() }),
    );
    SummarizedEvent {
        event_id: event.id,
        received_at: event.received_at,
        kind: kind.to_string(),
        digest: digest.0[..16].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::context::EntityType;
    use crate::domain::models::focus::FocusKind;

    fn memory(max_events: usize, focus_cap: usize) -> WorkingMemory {
        let config = MemoryConfig { max_events, focus_cap, entity_ttl_s: 60 };
        WorkingMemory::new(AgentId::new(), "test objective", config)
    }

    fn user_message(text: &str) -> Observation {
        Observation::new(ObservationPayload::UserMessage { text: text.to_string() })
    }

    fn entity(name: &str) -> EntityRecord {
        EntityRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            entity_type: EntityType::Identifier,
            attributes: serde_json::Value::Null,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn history_queue_never_exceeds_max_events() {
        let memory = memory(3, 7);
        for i in 0..10 {
            memory.push_event(user_message(&format!("event {i}"))).await;
        }
        assert_eq!(memory.event_count().await, 3);
    }

    #[tokio::test]
    async fn focus_cap_evicts_lowest_priority_then_oldest() {
        let memory = memory(16, 2);
        let low = FocusItem::new(FocusKind::Fact, "low priority", 1);
        let high = FocusItem::new(FocusKind::Decision, "high priority", 9);
        let low_id = low.id;
        memory.add_focus(low).await;
        memory.add_focus(high).await;
        memory.add_focus(FocusItem::new(FocusKind::Task, "newcomer", 5)).await;

        assert_eq!(memory.focus_len().await, 2);
        assert!(!memory.focus_items().await.iter().any(|i| i.id == low_id));
    }

    #[tokio::test]
    async fn entity_cache_respects_ttl() {
        let memory = memory(16, 7);
        memory.cache_entity("ticker", entity("ACME"), Duration::from_millis(10)).await;
        assert!(memory.read_entity("ticker").await.is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(memory.read_entity("ticker").await.is_none());
    }

    #[tokio::test]
    async fn read_context_filters_by_query() {
        let memory = memory(16, 7);
        memory.push_event(user_message("the revenue report arrived")).await;
        memory.push_event(user_message("lunch menu updated")).await;

        let all = memory.read_context(None).await;
        assert_eq!(all.len(), 2);
        let filtered = memory.read_context(Some("revenue")).await;
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn flush_drains_everything_exactly_once() {
        let memory = memory(16, 7);
        memory.push_event(user_message("observed one")).await;
        memory.push_event(user_message("observed two")).await;
        memory.record_decision("labeling", "chose imperative/urgent").await;
        memory.cache_entity("acme", entity("ACME"), Duration::from_secs(60)).await;

        let summary = memory
            .flush_to_summarizer(BudgetAmounts::tokens(10), false)
            .await;
        assert_eq!(summary.events.len(), 2);
        assert_eq!(summary.decisions.len(), 1);
        assert_eq!(summary.entities.len(), 1);

        // Immediate re-flush is empty: nothing lost, nothing duplicated.
        let again = memory
            .flush_to_summarizer(BudgetAmounts::default(), false)
            .await;
        assert!(again.is_empty());
        assert_eq!(memory.event_count().await, 0);
    }

    #[tokio::test]
    async fn evicted_events_do_not_reach_the_summary() {
        let memory = memory(2, 7);
        memory.push_event(user_message("first")).await;
        memory.push_event(user_message("second")).await;
        memory.push_event(user_message("third")).await;

        let summary = memory.flush_to_summarizer(BudgetAmounts::default(), false).await;
        // Exactly the retained window: the evicted event appears nowhere.
        assert_eq!(summary.events.len(), 2);
    }

    #[tokio::test]
    async fn journal_rejects_forward_references() {
        let memory = memory(16, 7);
        let ghost = EventId::new();
        let first = memory.journal_append("error", "tool failed", vec![ghost]).await;
        let second = memory.journal_append("replan", "routed around failure", vec![first]).await;
        assert_ne!(first, second);

        let summary = memory.flush_to_summarizer(BudgetAmounts::default(), false).await;
        assert!(summary.journal[0].caused_by.is_empty());
        assert_eq!(summary.journal[1].caused_by, vec![first]);
    }

    #[tokio::test]
    async fn update_dag_state_returns_snapshot() {
        let memory = memory(16, 7);
        let dag_id = DagId::new();
        let node = NodeId::new();
        let snap = memory.update_dag_state(dag_id, node, NodeStatus::Running).await;
        assert_eq!(snap.get(&node), Some(&NodeStatus::Running));
    }
}
