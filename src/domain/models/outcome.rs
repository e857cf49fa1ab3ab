//! Execution results, cost telemetry, and simulation verdicts.

use serde::{Deserialize, Serialize};

use crate::domain::errors::ErrorEnvelope;

use super::dag::{NodeStatus, RiskClass};
use super::ids::NodeId;
use super::schema::ValueSchema;
use super::task::SkillTag;

/// Cost accounting for one operation: the kernel's single budget currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTelemetry {
    pub tokens: u64,
    pub wall_ms: u64,
    pub bytes: u64,
}

impl CostTelemetry {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn tokens(tokens: u64) -> Self {
        Self { tokens, ..Self::default() }
    }
}

impl std::ops::Add for CostTelemetry {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            tokens: self.tokens + rhs.tokens,
            wall_ms: self.wall_ms + rhs.wall_ms,
            bytes: self.bytes + rhs.bytes,
        }
    }
}

impl std::ops::AddAssign for CostTelemetry {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// The outcome of one node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub node_id: NodeId,
    pub status: NodeStatus,
    /// Schema-validated payload; `Null` on failure.
    pub payload: serde_json::Value,
    pub cost: CostTelemetry,
    pub error: Option<ErrorEnvelope>,
}

impl ExecutionResult {
    pub fn succeeded(node_id: NodeId, payload: serde_json::Value, cost: CostTelemetry) -> Self {
        Self { node_id, status: NodeStatus::Succeeded, payload, cost, error: None }
    }

    pub fn failed(node_id: NodeId, envelope: ErrorEnvelope, cost: CostTelemetry) -> Self {
        Self {
            node_id,
            status: NodeStatus::Failed,
            payload: serde_json::Value::Null,
            cost,
            error: Some(envelope),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }
}

/// Whether a predicted side effect can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reversibility {
    Reversible,
    /// Recoverable with effort (restore from a copy, re-run upstream work).
    Recoverable,
    Irreversible,
}

/// One branch of the what-if outcome tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeBranch {
    pub node_id: NodeId,
    pub description: String,
    pub predicted_cost: CostTelemetry,
    pub reversibility: Reversibility,
    pub risk: RiskClass,
    /// Estimated probability of success in `[0.0, 1.0]`.
    pub success_probability: f64,
    /// Urgency-weighted severity of the failure case, in `[0.0, 1.0]`.
    pub severity: f64,
}

/// The three-way what-if verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationVerdict {
    Approve,
    Reject,
    Modify,
}

/// A safeguard node the simulation engine asks the planner to append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeguardNode {
    /// The node the safeguard protects.
    pub guards: NodeId,
    pub description: String,
    pub skill: SkillTag,
    pub args: serde_json::Value,
    pub output_schema: ValueSchema,
}

/// Full simulation report: verdict, rationale, and optional patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub verdict: SimulationVerdict,
    pub rationale: String,
    /// Safeguards to append; only meaningful when the verdict is `Modify`.
    #[serde(default)]
    pub patch: Vec<SafeguardNode>,
    pub branches: Vec<OutcomeBranch>,
}

impl SimulationReport {
    pub fn approve(rationale: impl Into<String>, branches: Vec<OutcomeBranch>) -> Self {
        Self {
            verdict: SimulationVerdict::Approve,
            rationale: rationale.into(),
            patch: Vec::new(),
            branches,
        }
    }

    pub fn reject(rationale: impl Into<String>, branches: Vec<OutcomeBranch>) -> Self {
        Self {
            verdict: SimulationVerdict::Reject,
            rationale: rationale.into(),
            patch: Vec::new(),
            branches,
        }
    }
}

/// Post-execution self-critique extracted by the reflection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionInsight {
    pub dag_id: super::ids::DagId,
    pub what_succeeded: Vec<String>,
    pub what_failed: Vec<String>,
    pub what_to_change: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_telemetry_adds_componentwise() {
        let a = CostTelemetry { tokens: 10, wall_ms: 5, bytes: 100 };
        let b = CostTelemetry { tokens: 1, wall_ms: 2, bytes: 3 };
        let sum = a + b;
        assert_eq!(sum, CostTelemetry { tokens: 11, wall_ms: 7, bytes: 103 });
    }

    #[test]
    fn failed_result_carries_envelope_and_null_payload() {
        use crate::domain::errors::{ErrorEnvelope, ErrorKind};
        let node = NodeId::new();
        let result = ExecutionResult::failed(
            node,
            ErrorEnvelope::new(ErrorKind::PermanentExternal, "410 gone").for_node(node.0),
            CostTelemetry::zero(),
        );
        assert!(!result.is_success());
        assert!(result.payload.is_null());
        assert_eq!(result.error.unwrap().node_id, Some(node.0));
    }

    #[test]
    fn reversibility_orders_by_severity() {
        assert!(Reversibility::Irreversible > Reversibility::Recoverable);
        assert!(Reversibility::Recoverable > Reversibility::Reversible);
    }
}
