//! Plan synthesizer (T3): sub-tasks in, typed executable DAG out.
//!
//! Resolves every sub-task to a concrete node through the assembler,
//! wires the dependency edges, and checks structural assignability for
//! each edge. Any failure aborts synthesis: no partial DAG is emitted.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::domain::models::dag::{DagError, PlanDag, PlanNode, RiskClass};
use crate::domain::models::ids::{CacheKey, NodeId};
use crate::domain::models::outcome::SafeguardNode;
use crate::domain::models::schema::ValueSchema;
use crate::domain::models::task::{ExplorationTask, SubTask};
use crate::infrastructure::hashing::generate_cache_key;

use super::assembler::{AssembledNode, NodeAssembler};

/// Synthesis failures. Surfaced immediately; the caller gets no DAG.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("unknown dependency {dependency} declared by sub-task `{task}`")]
    UnknownDependency { task: String, dependency: uuid::Uuid },

    #[error("output of `{from}` is not assignable to the input of `{target}`")]
    SchemaMismatch { from: String, target: String },

    #[error("graph construction failed: {0}")]
    Graph(#[from] DagError),

    #[error("skill resolution failed: {0}")]
    Skill(#[from] crate::domain::errors::KernelError),

    #[error("nothing to plan: empty sub-task list")]
    Empty,
}

/// A synthesized plan: the serializable DAG plus its assembled callables.
#[derive(Debug)]
pub struct CompiledPlan {
    pub dag: PlanDag,
    pub callables: HashMap<NodeId, Arc<AssembledNode>>,
}

impl CompiledPlan {
    /// Deterministic content hash over the plan's structure, used for
    /// consensus tie-breaks and plan dedup.
    pub fn content_hash(&self) -> CacheKey {
        let mut nodes: Vec<_> = self
            .dag
            .nodes
            .values()
            .map(|n| json!({ "skill": n.skill.as_str(), "description": n.description, "args": n.args }))
            .collect();
        nodes.sort_by_key(|v| v.to_string());
        let mut edges: Vec<String> = self
            .dag
            .edges
            .iter()
            .map(|(a, b)| format!("{a}->{b}"))
            .collect();
        edges.sort();
        generate_cache_key("plan", &json!({ "nodes": nodes, "edges": edges }))
    }
}

/// The T3 synthesizer.
pub struct PlanSynthesizer {
    assembler: NodeAssembler,
}

impl PlanSynthesizer {
    pub fn new(assembler: NodeAssembler) -> Self {
        Self { assembler }
    }

    /// Compile sub-tasks plus curiosity-generated exploration tasks into
    /// a typed DAG.
    ///
    /// Exploration tasks are prepended: any sub-task whose required
    /// input names an exploration's gap variable gains a dependency on
    /// that exploration node.
    pub fn compile_plan(
        &self,
        subtasks: &[SubTask],
        explorations: Vec<ExplorationTask>,
    ) -> Result<CompiledPlan, SynthesisError> {
        if subtasks.is_empty() && explorations.is_empty() {
            return Err(SynthesisError::Empty);
        }

        // Gap variable -> exploration node id, for dependency wiring.
        let gap_index: HashMap<String, uuid::Uuid> = explorations
            .iter()
            .map(|e| (e.gap_variable.clone(), e.id))
            .collect();

        let mut all_tasks: Vec<SubTask> =
            explorations.into_iter().map(ExplorationTask::into_subtask).collect();
        all_tasks.extend(subtasks.iter().cloned());

        let mut dag = PlanDag::new();
        for task in &all_tasks {
            let mut node = PlanNode::from_subtask(task);
            node.risk = risk_for(task);
            node.args = bind_args(task);
            dag.add_node(node);
        }

        // Declared dependencies plus gap-filling edges.
        for task in &all_tasks {
            let target = NodeId(task.id);
            for dep in &task.depends_on {
                if !dag.nodes.contains_key(&NodeId(*dep)) {
                    return Err(SynthesisError::UnknownDependency {
                        task: task.description.clone(),
                        dependency: *dep,
                    });
                }
                self.check_edge(&dag, NodeId(*dep), target)?;
                dag.try_add_edge(NodeId(*dep), target)?;
            }
            for field in required_input_fields(task) {
                if let Some(&exploration_id) = gap_index.get(&field) {
                    if exploration_id != task.id {
                        let source = NodeId(exploration_id);
                        self.check_edge(&dag, source, target)?;
                        dag.try_add_edge(source, target)?;
                    }
                }
            }
        }

        // JIT stage: every node body becomes an assembled callable.
        let mut callables = HashMap::with_capacity(dag.nodes.len());
        for (id, node) in &dag.nodes {
            callables.insert(*id, Arc::new(self.assembler.assemble(node)?));
        }

        debug!(nodes = dag.nodes.len(), edges = dag.edges.len(), "plan compiled");
        Ok(CompiledPlan { dag, callables })
    }

    /// Compile a conservative variant of the same sub-tasks with every
    /// parallel sibling serialized in list order. Used as an alternate
    /// candidate for the consensus vote.
    pub fn compile_serialized(
        &self,
        subtasks: &[SubTask],
        explorations: Vec<ExplorationTask>,
    ) -> Result<CompiledPlan, SynthesisError> {
        let mut chained: Vec<SubTask> = subtasks.to_vec();
        for i in 1..chained.len() {
            let prev_id = chained[i - 1].id;
            if !chained[i].depends_on.contains(&prev_id) {
                chained[i].depends_on.push(prev_id);
                chained[i].parallelizable = false;
            }
        }
        self.compile_plan(&chained, explorations)
    }

    /// Append safeguard nodes from a what-if `Modify` patch: each
    /// safeguard becomes a dependency of the node it guards.
    pub fn apply_patch(
        &self,
        plan: &mut CompiledPlan,
        patch: &[SafeguardNode],
    ) -> Result<(), SynthesisError> {
        for safeguard in patch {
            let mut task = SubTask::new(safeguard.description.clone(), safeguard.skill.clone());
            task.output_schema = safeguard.output_schema.clone();
            let mut node = PlanNode::from_subtask(&task);
            node.args = safeguard.args.clone();
            let guard_id = plan.dag.add_node(node.clone());
            plan.dag.try_add_edge(guard_id, safeguard.guards)?;
            plan.callables.insert(guard_id, Arc::new(self.assembler.assemble(&node)?));
        }
        Ok(())
    }

    fn check_edge(&self, dag: &PlanDag, source: NodeId, target: NodeId) -> Result<(), SynthesisError> {
        let (Some(source_node), Some(target_node)) = (dag.nodes.get(&source), dag.nodes.get(&target))
        else {
            return Ok(());
        };
        if target_node.input_schema.accepts(&source_node.output_schema) {
            Ok(())
        } else {
            Err(SynthesisError::SchemaMismatch {
                from: source_node.description.clone(),
                target: target_node.description.clone(),
            })
        }
    }
}

impl Default for PlanSynthesizer {
    fn default() -> Self {
        Self::new(NodeAssembler::default())
    }
}

fn required_input_fields(task: &SubTask) -> Vec<String> {
    match &task.input_schema {
        ValueSchema::Record { required, .. } => required.clone(),
        _ => Vec::new(),
    }
}

/// Bind concrete arguments from the sub-task description: quoted text
/// for classification, job identifiers for polling, the description
/// itself as the query elsewhere.
fn bind_args(task: &SubTask) -> serde_json::Value {
    let description = task.description.as_str();
    let quoted = regex::Regex::new(r#""([^"]+)"|`([^`]+)`"#)
        .ok()
        .and_then(|p| p.captures(description))
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().trim_matches('"').to_string());

    match task.skill.as_str() {
        "text.classify" => {
            json!({ "text": quoted.unwrap_or_else(|| description.to_string()) })
        }
        "job.poll" => {
            let job_id = quoted.or_else(|| {
                regex::Regex::new(r"\b[A-Z]+\d+\b")
                    .ok()
                    .and_then(|p| p.find(description))
                    .map(|m| m.as_str().to_string())
            });
            json!({ "job_id": job_id })
        }
        skill if skill.starts_with("fs.") => {
            json!({ "target": quoted.unwrap_or_else(|| description.to_string()) })
        }
        _ => json!({ "query": description }),
    }
}

fn risk_for(task: &SubTask) -> RiskClass {
    let skill = task.skill.as_str();
    if skill == "fs.delete" {
        RiskClass::Destructive
    } else if skill.starts_with("fs.") || skill == "web.scrape" {
        RiskClass::Mutating
    } else {
        RiskClass::Benign
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::StrategyChannel;

    #[test]
    fn chain_compiles_with_edges() {
        let a = SubTask::new("search the filings", "web.search");
        let b = SubTask::new("summarize findings", "text.summarize").depends_on([a.id]);
        let plan = PlanSynthesizer::default().compile_plan(&[a, b], vec![]).unwrap();

        assert_eq!(plan.dag.nodes.len(), 2);
        assert_eq!(plan.dag.edges.len(), 1);
        assert_eq!(plan.callables.len(), 2);
        assert!(!plan.dag.has_cycle());
    }

    #[test]
    fn schema_mismatch_emits_no_partial_dag() {
        let mut a = SubTask::new("produce a number", "numeric.eval");
        a.output_schema = ValueSchema::integer();
        let mut b = SubTask::new("consume text", "text.summarize");
        b.input_schema = ValueSchema::text();
        let b = b.depends_on([a.id]);

        let err = PlanSynthesizer::default().compile_plan(&[a, b], vec![]).unwrap_err();
        assert!(matches!(err, SynthesisError::SchemaMismatch { .. }));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let ghost = uuid::Uuid::new_v4();
        let task = SubTask::new("dependent", "web.search").depends_on([ghost]);
        let err = PlanSynthesizer::default().compile_plan(&[task], vec![]).unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownDependency { .. }));
    }

    #[test]
    fn explorations_are_prepended_as_dependencies() {
        let mut consumer = SubTask::new("fetch share price", "web.search");
        consumer.input_schema = ValueSchema::record(
            [("ticker".to_string(), ValueSchema::any())],
            vec!["ticker".to_string()],
        );
        let exploration =
            ExplorationTask::new("ticker", "resolve the ticker", StrategyChannel::Web);
        let exploration_id = NodeId(exploration.id);
        let consumer_id = NodeId(consumer.id);

        let plan = PlanSynthesizer::default()
            .compile_plan(&[consumer], vec![exploration])
            .unwrap();
        assert_eq!(plan.dag.nodes.len(), 2);
        assert!(plan.dag.edges.contains(&(exploration_id, consumer_id)));
    }

    #[test]
    fn unknown_skill_aborts_synthesis() {
        let task = SubTask::new("mystery work", "warp.drive");
        let err = PlanSynthesizer::default().compile_plan(&[task], vec![]).unwrap_err();
        assert!(matches!(err, SynthesisError::Skill(_)));
    }

    #[test]
    fn serialized_variant_chains_parallel_siblings() {
        let a = SubTask::new("search prices", "web.search");
        let b = SubTask::new("search volumes", "web.search");
        let synthesizer = PlanSynthesizer::default();

        let base = synthesizer.compile_plan(&[a.clone(), b.clone()], vec![]).unwrap();
        let serial = synthesizer.compile_serialized(&[a, b], vec![]).unwrap();

        assert_eq!(base.dag.edges.len(), 0);
        assert_eq!(serial.dag.edges.len(), 1);
        assert!(!serial.dag.has_cycle());
        assert_ne!(base.content_hash(), serial.content_hash());
    }

    #[test]
    fn content_hash_ignores_compile_order() {
        let a = SubTask::new("alpha", "web.search");
        let b = SubTask::new("beta", "web.search");
        let plan_ab =
            PlanSynthesizer::default().compile_plan(&[a.clone(), b.clone()], vec![]).unwrap();
        let plan_ba = PlanSynthesizer::default().compile_plan(&[b, a], vec![]).unwrap();
        assert_eq!(plan_ab.content_hash(), plan_ba.content_hash());
    }

    #[test]
    fn patch_appends_safeguard_before_guarded_node() {
        let risky = SubTask::new("update the archive", "fs.backup");
        let risky_id = NodeId(risky.id);
        let synthesizer = PlanSynthesizer::default();
        let mut plan = synthesizer.compile_plan(&[risky], vec![]).unwrap();

        let patch = vec![SafeguardNode {
            guards: risky_id,
            description: "snapshot state first".into(),
            skill: "fs.backup".into(),
            args: serde_json::Value::Null,
            output_schema: ValueSchema::any(),
        }];
        synthesizer.apply_patch(&mut plan, &patch).unwrap();

        assert_eq!(plan.dag.nodes.len(), 2);
        let guard_id = *plan
            .dag
            .nodes
            .keys()
            .find(|id| **id != risky_id)
            .unwrap();
        assert!(plan.dag.edges.contains(&(guard_id, risky_id)));
        // The guarded node cannot run until the safeguard succeeds.
        assert_eq!(plan.dag.runnable_nodes(), vec![guard_id]);
    }
}
