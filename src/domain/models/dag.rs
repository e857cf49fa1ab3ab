//! Typed execution graphs emitted by the plan synthesizer.
//!
//! A [`PlanDag`] maps node ids to node descriptors plus a directed edge
//! set and a status table. The edge set is acyclic at all times: edges
//! appended during replanning are rejected if they would close a cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::ids::{DagId, NodeId};
use super::schema::ValueSchema;
use super::task::{RetryPolicy, SkillTag, SubTask};

/// Execution status of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    /// Suspended on an asynchronous continuation.
    Parked,
    Succeeded,
    Failed,
    Skipped,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Parked => "parked",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Coarse risk classification assigned at synthesis time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Read-only or pure computation.
    Benign,
    /// Writes state that can be undone.
    Mutating,
    /// Destroys state that cannot be recovered.
    Destructive,
}

impl Default for RiskClass {
    fn default() -> Self {
        Self::Benign
    }
}

/// Descriptor for one node: skill, bound arguments, and I/O contracts.
///
/// The assembled callable is held separately by the compiled plan; the
/// descriptor itself stays serializable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub description: String,
    pub skill: SkillTag,
    /// Arguments bound at synthesis time.
    pub args: serde_json::Value,
    pub input_schema: ValueSchema,
    pub output_schema: ValueSchema,
    pub retry: RetryPolicy,
    pub timeout_ms: u64,
    #[serde(default)]
    pub risk: RiskClass,
}

impl PlanNode {
    pub fn from_subtask(task: &SubTask) -> Self {
        Self {
            id: NodeId(task.id),
            description: task.description.clone(),
            skill: task.skill.clone(),
            args: serde_json::Value::Null,
            input_schema: task.input_schema.clone(),
            output_schema: task.output_schema.clone(),
            retry: task.retry,
            timeout_ms: task.timeout_ms,
            risk: RiskClass::Benign,
        }
    }
}

/// DAG structure errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DagError {
    #[error("edge {0} -> {1} would close a cycle")]
    WouldCycle(NodeId, NodeId),
    #[error("cycle detected in plan graph")]
    CycleDetected,
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("output of {from} is not assignable to input of {target}")]
    SchemaMismatch { from: NodeId, target: NodeId },
}

/// A typed, acyclic execution graph with a status table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDag {
    pub id: DagId,
    pub nodes: HashMap<NodeId, PlanNode>,
    /// Directed edges `(dependency, dependent)`.
    pub edges: Vec<(NodeId, NodeId)>,
    pub status: HashMap<NodeId, NodeStatus>,
}

impl PlanDag {
    pub fn new() -> Self {
        Self {
            id: DagId::new(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            status: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: PlanNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        self.status.insert(id, NodeStatus::Pending);
        id
    }

    /// Append an edge, rejecting unknown endpoints and cycles.
    pub fn try_add_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), DagError> {
        if !self.nodes.contains_key(&from) {
            return Err(DagError::UnknownNode(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(DagError::UnknownNode(to));
        }
        self.edges.push((from, to));
        if self.has_cycle() {
            self.edges.pop();
            return Err(DagError::WouldCycle(from, to));
        }
        Ok(())
    }

    /// Direct dependencies of `node`.
    pub fn dependencies(&self, node: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(_, to)| *to == node)
            .map(|(from, _)| *from)
            .collect()
    }

    /// Direct dependents of `node`.
    pub fn dependents(&self, node: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(from, _)| *from == node)
            .map(|(_, to)| *to)
            .collect()
    }

    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for &node_id in self.nodes.keys() {
            if self.cycle_dfs(node_id, &mut visited, &mut rec_stack) {
                return true;
            }
        }
        false
    }

    fn cycle_dfs(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        rec_stack: &mut HashSet<NodeId>,
    ) -> bool {
        if rec_stack.contains(&node_id) {
            return true;
        }
        if visited.contains(&node_id) {
            return false;
        }
        visited.insert(node_id);
        rec_stack.insert(node_id);
        for dependent in self.dependents(node_id) {
            if self.cycle_dfs(dependent, visited, rec_stack) {
                return true;
            }
        }
        rec_stack.remove(&node_id);
        false
    }

    /// Kahn topological sort over the node set.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, DagError> {
        let mut in_degree: HashMap<NodeId, usize> =
            self.nodes.keys().map(|&id| (id, 0)).collect();
        for (_, to) in &self.edges {
            if let Some(d) = in_degree.get_mut(to) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            result.push(id);
            for dependent in self.dependents(id) {
                if let Some(d) = in_degree.get_mut(&dependent) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if result.len() == self.nodes.len() {
            Ok(result)
        } else {
            Err(DagError::CycleDetected)
        }
    }

    /// Nodes whose dependencies have all succeeded and which are still pending.
    pub fn runnable_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|&&id| {
                self.status.get(&id) == Some(&NodeStatus::Pending)
                    && self
                        .dependencies(id)
                        .iter()
                        .all(|dep| self.status.get(dep) == Some(&NodeStatus::Succeeded))
            })
            .copied()
            .collect()
    }

    /// Nodes stranded behind a failed or skipped dependency.
    pub fn stranded_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|&&id| {
                self.status.get(&id) == Some(&NodeStatus::Pending)
                    && self.dependencies(id).iter().any(|dep| {
                        matches!(
                            self.status.get(dep),
                            Some(NodeStatus::Failed | NodeStatus::Skipped)
                        )
                    })
            })
            .copied()
            .collect()
    }

    pub fn set_status(&mut self, node: NodeId, status: NodeStatus) -> Result<(), DagError> {
        if !self.nodes.contains_key(&node) {
            return Err(DagError::UnknownNode(node));
        }
        self.status.insert(node, status);
        Ok(())
    }

    /// Terminal when every node is succeeded, failed, or skipped.
    pub fn is_terminal(&self) -> bool {
        self.nodes
            .keys()
            .all(|id| self.status.get(id).is_some_and(NodeStatus::is_terminal))
    }

    pub fn succeeded(&self) -> bool {
        self.nodes
            .keys()
            .all(|id| self.status.get(id) == Some(&NodeStatus::Succeeded))
    }

    /// Highest risk class present in the graph.
    pub fn max_risk(&self) -> RiskClass {
        self.nodes
            .values()
            .map(|n| n.risk)
            .max()
            .unwrap_or_default()
    }
}

impl Default for PlanDag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(description: &str) -> PlanNode {
        PlanNode {
            id: NodeId::new(),
            description: description.to_string(),
            skill: SkillTag::new("test.noop"),
            args: serde_json::Value::Null,
            input_schema: ValueSchema::any(),
            output_schema: ValueSchema::any(),
            retry: RetryPolicy::none(),
            timeout_ms: 1_000,
            risk: RiskClass::Benign,
        }
    }

    #[test]
    fn edge_append_preserves_acyclicity() {
        let mut dag = PlanDag::new();
        let a = dag.add_node(make_node("a"));
        let b = dag.add_node(make_node("b"));
        let c = dag.add_node(make_node("c"));

        dag.try_add_edge(a, b).unwrap();
        dag.try_add_edge(b, c).unwrap();
        let err = dag.try_add_edge(c, a).unwrap_err();
        assert!(matches!(err, DagError::WouldCycle(_, _)));
        // The rejected edge must not linger.
        assert_eq!(dag.edges.len(), 2);
        assert!(!dag.has_cycle());
    }

    #[test]
    fn topological_sort_orders_dependencies_first() {
        let mut dag = PlanDag::new();
        let a = dag.add_node(make_node("a"));
        let b = dag.add_node(make_node("b"));
        let c = dag.add_node(make_node("c"));
        dag.try_add_edge(a, b).unwrap();
        dag.try_add_edge(a, c).unwrap();

        let sorted = dag.topological_sort().unwrap();
        let pos = |id| sorted.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
    }

    #[test]
    fn runnable_tracks_succeeded_dependencies() {
        let mut dag = PlanDag::new();
        let a = dag.add_node(make_node("a"));
        let b = dag.add_node(make_node("b"));
        dag.try_add_edge(a, b).unwrap();

        assert_eq!(dag.runnable_nodes(), vec![a]);
        dag.set_status(a, NodeStatus::Succeeded).unwrap();
        assert_eq!(dag.runnable_nodes(), vec![b]);
    }

    #[test]
    fn stranded_nodes_behind_failures() {
        let mut dag = PlanDag::new();
        let a = dag.add_node(make_node("a"));
        let b = dag.add_node(make_node("b"));
        dag.try_add_edge(a, b).unwrap();
        dag.set_status(a, NodeStatus::Failed).unwrap();

        assert_eq!(dag.stranded_nodes(), vec![b]);
        assert!(dag.runnable_nodes().is_empty());
    }

    #[test]
    fn terminal_when_all_nodes_finish() {
        let mut dag = PlanDag::new();
        let a = dag.add_node(make_node("a"));
        let b = dag.add_node(make_node("b"));
        assert!(!dag.is_terminal());
        dag.set_status(a, NodeStatus::Succeeded).unwrap();
        dag.set_status(b, NodeStatus::Skipped).unwrap();
        assert!(dag.is_terminal());
        assert!(!dag.succeeded());
    }
}
