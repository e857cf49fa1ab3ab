//! What-if simulation engine (T2).
//!
//! Builds an outcome tree for a proposed DAG against the current world:
//! predicts side effects per branch (cost, mutation, reversibility),
//! weights severity through the T1 urgency scorer, and aggregates into
//! an approve / reject / modify verdict.
//!
//! Policy: an irreversible destructive branch with success probability
//! below the configured floor rejects the plan outright, regardless of
//! the aggregate score.

use serde_json::json;
use tracing::debug;

use crate::domain::models::config::PlanningConfig;
use crate::domain::models::dag::{PlanDag, PlanNode, RiskClass};
use crate::domain::models::outcome::{
    CostTelemetry, OutcomeBranch, Reversibility, SafeguardNode, SimulationReport,
    SimulationVerdict,
};
use crate::domain::models::schema::ValueSchema;
use crate::domain::models::task::SkillTag;
use crate::domain::models::world::WorldSnapshot;

use super::extract::ScoringPrimitives;

const DESTRUCTIVE_MARKERS: &[&str] =
    &["delete", "remove", "purge", "drop", "truncate", "destroy", "wipe", "kill"];
const MUTATING_MARKERS: &[&str] = &["write", "update", "create", "move", "rename", "deploy", "post"];

/// The T2 simulation engine.
pub struct WhatIfEngine {
    config: PlanningConfig,
}

impl WhatIfEngine {
    pub fn new(config: PlanningConfig) -> Self {
        Self { config }
    }

    /// Simulate `dag` against the current world and return a verdict.
    pub fn simulate_outcomes(&self, dag: &PlanDag, snapshot: &WorldSnapshot) -> SimulationReport {
        let mut branches = Vec::with_capacity(dag.nodes.len());

        for node in dag.nodes.values() {
            branches.push(self.assess_branch(node, snapshot));
        }
        branches.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        // Hard policy gate first.
        for branch in &branches {
            if branch.reversibility == Reversibility::Irreversible
                && branch.success_probability < self.config.min_destructive_success
            {
                debug!(node = %branch.node_id, p = branch.success_probability, "irreversible branch below success floor");
                return SimulationReport::reject(
                    format!(
                        "irreversible destructive step `{}` has success probability {:.2}, below the {:.2} floor",
                        branch.description, branch.success_probability, self.config.min_destructive_success
                    ),
                    branches,
                );
            }
        }

        let aggregate = aggregate_branch_score(&branches);
        if aggregate < self.config.modify_threshold {
            let patch = self.safeguards_for(&branches);
            return SimulationReport {
                verdict: SimulationVerdict::Modify,
                rationale: format!(
                    "aggregate outcome score {aggregate:.2} below {:.2}; appending {} safeguard node(s)",
                    self.config.modify_threshold,
                    patch.len()
                ),
                patch,
                branches,
            };
        }

        SimulationReport::approve(
            format!("aggregate outcome score {aggregate:.2} within tolerance"),
            branches,
        )
    }

    fn assess_branch(&self, node: &PlanNode, snapshot: &WorldSnapshot) -> OutcomeBranch {
        let surface = format!("{} {} {}", node.skill, node.description, node.args);
        let lower = surface.to_lowercase();

        let destructive = DESTRUCTIVE_MARKERS.iter().any(|m| lower.contains(m));
        let mutating = MUTATING_MARKERS.iter().any(|m| lower.contains(m));

        let (risk, reversibility) = if destructive || node.risk == RiskClass::Destructive {
            (RiskClass::Destructive, Reversibility::Irreversible)
        } else if mutating || node.risk == RiskClass::Mutating {
            (RiskClass::Mutating, Reversibility::Recoverable)
        } else {
            (RiskClass::Benign, Reversibility::Reversible)
        };

        let success_probability = match risk {
            RiskClass::Benign => 0.95,
            RiskClass::Mutating => 0.85,
            // Unverified destructive work against a live world is assumed
            // likely to destroy something it should not.
            RiskClass::Destructive => 0.5,
        };

        // Severity: how bad the failure case is, weighted by how urgent
        // the surrounding objective sounds.
        let urgency = ScoringPrimitives::score_urgency(&snapshot.objective.text);
        let base_severity = match risk {
            RiskClass::Benign => 0.1,
            RiskClass::Mutating => 0.4,
            RiskClass::Destructive => 0.9,
        };
        let severity = (base_severity * (0.5 + 0.5 * urgency)).min(1.0);

        OutcomeBranch {
            node_id: node.id,
            description: node.description.clone(),
            predicted_cost: predict_cost(node),
            reversibility,
            risk,
            success_probability,
            severity,
        }
    }

    /// A backup safeguard for every recoverable-or-worse branch.
    fn safeguards_for(&self, branches: &[OutcomeBranch]) -> Vec<SafeguardNode> {
        branches
            .iter()
            .filter(|b| b.reversibility != Reversibility::Reversible)
            .map(|b| SafeguardNode {
                guards: b.node_id,
                description: format!("snapshot affected state before: {}", b.description),
                skill: SkillTag::new("fs.backup"),
                args: json!({ "reason": "pre-mutation snapshot" }),
                output_schema: ValueSchema::record(
                    [("backup_id".to_string(), ValueSchema::text())],
                    vec!["backup_id".to_string()],
                ),
            })
            .collect()
    }
}

/// Mean success weighted down by severity.
fn aggregate_branch_score(branches: &[OutcomeBranch]) -> f64 {
    if branches.is_empty() {
        return 1.0;
    }
    branches
        .iter()
        .map(|b| b.success_probability * (1.0 - 0.5 * b.severity))
        .sum::<f64>()
        / branches.len() as f64
}

fn predict_cost(node: &PlanNode) -> CostTelemetry {
    // Crude static prediction: external skills dominate wall time.
    let external = node.skill.as_str().starts_with("web.") || node.skill.as_str().starts_with("job.");
    CostTelemetry {
        tokens: 50 + node.description.len() as u64 / 4,
        wall_ms: if external { 2_000 } else { 100 },
        bytes: 1_024,
    }
}
