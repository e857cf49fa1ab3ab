//! Guardrails, consensus, and reflection (T3).
//!
//! Pre-execution: what-if simulation, an optional consensus vote across
//! plan variants, and a value/policy check against the identity's
//! non-negotiable rules. A rejected plan never executes; the caller is
//! handed the rationale for the replan.
//!
//! Post-execution: reflection compares predicted against actual
//! outcomes and extracts insights destined for the epoch summary.

use tracing::{debug, warn};

use crate::domain::models::config::PlanningConfig;
use crate::domain::models::identity::IdentityContext;
use crate::domain::models::outcome::{
    ExecutionResult, ReflectionInsight, SafeguardNode, SimulationReport, SimulationVerdict,
};
use crate::domain::models::world::WorldSnapshot;

use super::planner::CompiledPlan;
use super::whatif::WhatIfEngine;

/// Outcome of the pre-execution gate.
#[derive(Debug, Clone)]
pub enum GuardrailVerdict {
    Approved,
    /// Approved provided the safeguard patch is appended first.
    ApprovedWithPatch(Vec<SafeguardNode>),
    Rejected { rationale: String },
}

impl GuardrailVerdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// The pre-execution guardrail gate.
pub struct GuardrailGate {
    whatif: WhatIfEngine,
}

impl GuardrailGate {
    pub fn new(config: PlanningConfig) -> Self {
        Self { whatif: WhatIfEngine::new(config) }
    }

    /// Run the full gate over a compiled plan.
    pub fn check(
        &self,
        plan: &CompiledPlan,
        snapshot: &WorldSnapshot,
        identity: &IdentityContext,
    ) -> (GuardrailVerdict, SimulationReport) {
        // Identity rules veto first: they are non-negotiable.
        if let Some(rationale) = self.policy_violation(plan, identity) {
            warn!(%rationale, "plan vetoed by identity policy");
            let report = SimulationReport::reject(rationale.clone(), Vec::new());
            return (GuardrailVerdict::Rejected { rationale }, report);
        }

        let report = self.whatif.simulate_outcomes(&plan.dag, snapshot);
        let verdict = match report.verdict {
            SimulationVerdict::Approve => GuardrailVerdict::Approved,
            SimulationVerdict::Modify => GuardrailVerdict::ApprovedWithPatch(report.patch.clone()),
            SimulationVerdict::Reject => {
                GuardrailVerdict::Rejected { rationale: report.rationale.clone() }
            }
        };
        (verdict, report)
    }

    /// Pick one plan out of `variants` by plausibility-weighted vote.
    ///
    /// Each variant's vote weight is its simulation aggregate (zero when
    /// rejected). Equal weights tie-break deterministically on the plan
    /// content hash: lowest hash wins.
    pub fn consensus_pick(
        &self,
        variants: &[CompiledPlan],
        snapshot: &WorldSnapshot,
    ) -> Option<usize> {
        if variants.is_empty() {
            return None;
        }

        let mut scored: Vec<(usize, f64, String)> = variants
            .iter()
            .enumerate()
            .map(|(i, plan)| {
                let report = self.whatif.simulate_outcomes(&plan.dag, snapshot);
                let weight = match report.verdict {
                    SimulationVerdict::Reject => 0.0,
                    _ => plausibility(&report),
                };
                (i, weight, plan.content_hash().0)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.cmp(&b.2))
        });
        debug!(winner = scored[0].0, weight = scored[0].1, "consensus vote complete");
        Some(scored[0].0)
    }

    fn policy_violation(&self, plan: &CompiledPlan, identity: &IdentityContext) -> Option<String> {
        for rule in &identity.rules {
            for node in plan.dag.nodes.values() {
                let surface =
                    format!("{} {} {}", node.skill, node.description, node.args).to_lowercase();
                if let Some(term) = rule.forbidden_terms.iter().find(|t| surface.contains(t.as_str())) {
                    return Some(format!(
                        "node `{}` violates non-negotiable rule `{}` (term `{term}`)",
                        node.description, rule.description
                    ));
                }
            }
        }
        None
    }
}

/// Mean branch success weighted against severity; the consensus weight.
fn plausibility(report: &SimulationReport) -> f64 {
    if report.branches.is_empty() {
        return 1.0;
    }
    report
        .branches
        .iter()
        .map(|b| b.success_probability * (1.0 - b.severity))
        .sum::<f64>()
        / report.branches.len() as f64
}

// ============================================================================
// Reflection
// ============================================================================

/// Post-execution self-critique.
pub struct ReflectionEngine;

impl ReflectionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compare the actual results against the simulation's predictions
    /// and produce a structured insight.
    pub fn reflect(
        &self,
        plan: &CompiledPlan,
        predicted: &SimulationReport,
        results: &[ExecutionResult],
    ) -> ReflectionInsight {
        let mut what_succeeded = Vec::new();
        let mut what_failed = Vec::new();
        let mut what_to_change = Vec::new();

        for result in results {
            let description = plan
                .dag
                .nodes
                .get(&result.node_id)
                .map_or_else(|| result.node_id.to_string(), |n| n.description.clone());

            if result.is_success() {
                what_succeeded.push(description);
                continue;
            }

            let reason = result
                .error
                .as_ref()
                .map_or_else(|| "unknown failure".to_string(), |e| e.message.clone());
            what_failed.push(format!("{description}: {reason}"));

            // Was this failure foreseen?
            let predicted_risky = predicted
                .branches
                .iter()
                .find(|b| b.node_id == result.node_id)
                .is_some_and(|b| b.success_probability < 0.9);
            if predicted_risky {
                what_to_change.push(format!(
                    "`{description}` failed as simulated; add a safeguard or choose a different skill"
                ));
            } else {
                what_to_change.push(format!(
                    "`{description}` failed unexpectedly; revisit the outcome model for this skill"
                ));
            }
        }

        if what_failed.is_empty() && results.len() < plan.dag.nodes.len() {
            what_to_change.push("plan finished with undispatched nodes; tighten the decomposition".to_string());
        }

        ReflectionInsight {
            dag_id: plan.dag.id,
            what_succeeded,
            what_failed,
            what_to_change,
        }
    }
}

impl Default for ReflectionEngine {
    fn default() -> Self {
        Self::new()
    }
}
