//! Observation events, interrupt signals, and the spawn request.
//!
//! Observations are the only way the outside world reaches the OODA loop:
//! tool completions, user messages, timer wakeups, and webhook arrivals
//! all drain through the Observe phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::budget::BudgetAmounts;
use super::ids::{AgentId, DagId, EventId, NodeId, TraceId};
use super::outcome::ExecutionResult;

/// Payload of an observation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationPayload {
    /// A dispatched node finished (successfully or not).
    ToolCompleted {
        dag_id: DagId,
        node_id: NodeId,
        result: ExecutionResult,
    },
    /// A node reported a continuation; the owning DAG must park.
    ToolParked {
        dag_id: DagId,
        node_id: NodeId,
        continuation: String,
        poll_after_ms: u64,
    },
    /// Free-form message from the requesting principal.
    UserMessage { text: String },
    /// A scheduled wake for a parked continuation fired.
    TimerWake { continuation: String },
    /// An external webhook resolved a parked continuation.
    WebhookArrived {
        continuation: String,
        payload: serde_json::Value,
    },
    /// Result of a tool-host health probe during panic recovery.
    HealthProbe { healthy: bool },
}

/// An observation with identity and arrival time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: EventId,
    pub received_at: DateTime<Utc>,
    pub payload: ObservationPayload,
}

impl Observation {
    pub fn new(payload: ObservationPayload) -> Self {
        Self { id: EventId::new(), received_at: Utc::now(), payload }
    }
}

/// Typed signals delivered on the interrupt channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterruptKind {
    Pause,
    Resume,
    /// Swap the macro-objective mid-flight.
    PriorityOverride { objective: String },
    Terminate,
}

/// An interrupt with its issue timestamp. Delivery order is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptSignal {
    pub kind: InterruptKind,
    pub issued_at: DateTime<Utc>,
}

impl InterruptSignal {
    pub fn new(kind: InterruptKind) -> Self {
        Self { kind, issued_at: Utc::now() }
    }
}

/// The only supported entry point into the lifecycle tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub agent_id: AgentId,
    pub profile_id: String,
    pub macro_objective: String,
    pub budget: BudgetAmounts,
    pub parent_trace_id: Option<TraceId>,
}

impl SpawnRequest {
    pub fn new(profile_id: impl Into<String>, objective: impl Into<String>, budget: BudgetAmounts) -> Self {
        Self {
            agent_id: AgentId::new(),
            profile_id: profile_id.into(),
            macro_objective: objective.into(),
            budget,
            parent_trace_id: None,
        }
    }
}
