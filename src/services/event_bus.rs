//! Kernel event bus: broadcast-based event streaming with sequence
//! numbering.
//!
//! The OODA engine, budget authority, hardware probe, and lifecycle
//! controller publish here; the lifecycle controller and observers
//! subscribe. Lossy by design: slow subscribers drop old events.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::models::budget::BudgetStatus;
use crate::domain::models::ids::{AgentId, DagId, EventId, NodeId};

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelEventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelEventCategory {
    Lifecycle,
    Execution,
    Plan,
    Cache,
    Budget,
    Pressure,
    Interrupt,
}

/// Typed event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum KernelEventPayload {
    AgentStateChanged { from: String, to: String },
    Heartbeat { state: String, tick: u64 },
    PhaseCompleted { phase: String, tick: u64 },
    PlanCompiled { dag_id: DagId, node_count: usize },
    PlanRejected { dag_id: DagId, rationale: String },
    NodeDispatched { dag_id: DagId, node_id: NodeId },
    NodeFinished { dag_id: DagId, node_id: NodeId, status: String },
    DagParked { dag_id: DagId, continuation: String },
    DagResumed { dag_id: DagId },
    DagCompleted { dag_id: DagId, succeeded: bool },
    BudgetThreshold { status: BudgetStatus, spent_tokens: u64 },
    PressureEviction { freed_bytes: u64 },
    PanicEntered { failure_streak: u32 },
    PanicRecovered,
    EpochCommitted { vault_id: String, budget_exhausted: bool },
    InterruptReceived { kind: String },
}

/// An event with identity, ordering, and attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelEvent {
    pub id: EventId,
    /// Monotonic per-bus sequence assigned at publish time.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: KernelEventSeverity,
    pub category: KernelEventCategory,
    pub agent_id: AgentId,
    pub payload: KernelEventPayload,
}

/// Broadcast bus shared by one agent's tiers.
pub struct KernelEventBus {
    agent_id: AgentId,
    tx: broadcast::Sender<KernelEvent>,
    sequence: AtomicU64,
}

impl KernelEventBus {
    pub fn new(agent_id: AgentId, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self { agent_id, tx, sequence: AtomicU64::new(0) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns its assigned sequence number.
    pub fn publish(
        &self,
        severity: KernelEventSeverity,
        category: KernelEventCategory,
        payload: KernelEventPayload,
    ) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = KernelEvent {
            id: EventId::new(),
            sequence,
            timestamp: Utc::now(),
            severity,
            category,
            agent_id: self.agent_id,
            payload,
        };
        // No subscribers is fine; events are advisory.
        let _ = self.tx.send(event);
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequences_are_monotonic() {
        let bus = KernelEventBus::new(AgentId::new(), 16);
        let mut rx = bus.subscribe();

        let s1 = bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Lifecycle,
            KernelEventPayload::Heartbeat { state: "active".into(), tick: 1 },
        );
        let s2 = bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Lifecycle,
            KernelEventPayload::Heartbeat { state: "active".into(), tick: 2 },
        );
        assert!(s2 > s1);

        assert_eq!(rx.recv().await.unwrap().sequence, s1);
        assert_eq!(rx.recv().await.unwrap().sequence, s2);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail() {
        let bus = KernelEventBus::new(AgentId::new(), 16);
        bus.publish(
            KernelEventSeverity::Warning,
            KernelEventCategory::Pressure,
            KernelEventPayload::PressureEviction { freed_bytes: 1024 },
        );
    }
}
