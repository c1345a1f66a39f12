//! Instance-level graph the critical path is computed on.
//!
//! One node per recorded activity instance, interned in table order, and one
//! edge per dependency. Node cost is the instance duration; wait instances
//! cost nothing since no work happens while waiting.

use crate::interner::{InstanceInterner, NodeId};
use crate::models::{Dependency, InstanceKind, RecordedActivity};
use crate::recorded::RecordedActivityTable;

/// Directed graph over recorded instances. Expected to be acyclic.
#[derive(Clone, Debug, Default)]
pub struct SimulationGraph {
    index: InstanceInterner,
    /// Node costs indexed by node id.
    costs: Vec<f64>,
    /// Predecessors indexed by node id.
    deps: Vec<Vec<NodeId>>,
    /// Successors indexed by node id.
    dependents: Vec<Vec<NodeId>>,
    edge_count: usize,
}

fn node_cost(instance: &RecordedActivity) -> f64 {
    match instance.kind {
        InstanceKind::Normal => (instance.end - instance.start).max(0.0),
        // The releaser -> wait edge already carries the time spent waiting;
        // costing the wait as well would count that span twice.
        InstanceKind::Wait => 0.0,
    }
}

impl SimulationGraph {
    /// Merge the table and the deduplicated dependency list into one graph.
    ///
    /// Dependencies naming unknown instances are ignored.
    pub fn build(table: &RecordedActivityTable, dependencies: &[Dependency]) -> Self {
        let n = table.len();
        let index: InstanceInterner = table.rows().iter().map(|r| r.id.as_str()).collect();
        let costs: Vec<f64> = table.rows().iter().map(node_cost).collect();

        let mut graph = Self {
            index,
            costs,
            deps: vec![Vec::new(); n],
            dependents: vec![Vec::new(); n],
            edge_count: 0,
        };
        for dep in dependencies {
            if let (Some(from), Some(to)) = (graph.node_id(&dep.from), graph.node_id(&dep.to)) {
                graph.add_edge(from, to);
            }
        }
        graph
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if from == to || self.dependents[from as usize].contains(&to) {
            return;
        }
        self.dependents[from as usize].push(to);
        self.deps[to as usize].push(from);
        self.edge_count += 1;
    }

    pub fn node_count(&self) -> usize {
        self.costs.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn node_id(&self, instance_id: &str) -> Option<NodeId> {
        self.index.get(instance_id)
    }

    pub fn instance_id(&self, node: NodeId) -> Option<&str> {
        self.index.resolve(node)
    }

    /// Every (node, instance id) pair in table order.
    pub fn instances(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.index.iter()
    }

    #[inline]
    pub fn cost(&self, node: NodeId) -> f64 {
        self.costs[node as usize]
    }

    #[inline]
    pub fn predecessors(&self, node: NodeId) -> &[NodeId] {
        &self.deps[node as usize]
    }

    #[inline]
    pub fn successors(&self, node: NodeId) -> &[NodeId] {
        &self.dependents[node as usize]
    }

    /// Total cost of all nodes.
    pub fn total_work(&self) -> f64 {
        self.costs.iter().sum()
    }
}
