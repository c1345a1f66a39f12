//! Critical path calculation using forward and backward passes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::interner::NodeId;
use crate::log_debug;

use super::graph::SimulationGraph;
use super::types::InstanceTiming;

/// Error types for critical path calculation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalPathError {
    /// Instances are time-ordered, so a cycle means inferred dependencies contradict the trace.
    #[error("dependency cycle detected among {} instances: {}", .instances.len(), .instances.join(", "))]
    Cycle { instances: Vec<String> },
}

/// Result of critical path calculation over a whole simulation graph.
#[derive(Clone, Debug, Default)]
pub struct CriticalPathResult {
    /// Timing information for each instance.
    pub instance_timings: FxHashMap<String, InstanceTiming>,
    /// Set of instance ids with zero slack.
    pub critical_instances: FxHashSet<String>,
    /// Latest earliest finish over all instances (makespan).
    pub critical_path_length: f64,
    /// Total work (sum of all node costs).
    pub total_work: f64,
}

impl CriticalPathResult {
    pub fn is_critical(&self, instance_id: &str) -> bool {
        self.critical_instances.contains(instance_id)
    }

    pub fn timing(&self, instance_id: &str) -> Option<&InstanceTiming> {
        self.instance_timings.get(instance_id)
    }
}

/// Calculate earliest and latest starts for every instance of `graph`.
///
/// Instances without predecessors may start at 0. Sinks must finish by the
/// makespan. Every instance whose slack is within `tolerance` of zero is
/// critical, so parallel chains and disconnected components of maximal
/// length are all marked.
pub fn calculate_critical_path(
    graph: &SimulationGraph,
    tolerance: f64,
    verbosity: u8,
) -> Result<CriticalPathResult, CriticalPathError> {
    let n = graph.node_count();
    if n == 0 {
        return Ok(CriticalPathResult::default());
    }

    let topo_order = topological_sort(graph)?;

    // Forward pass
    let mut timings = vec![InstanceTiming::default(); n];
    for &node in &topo_order {
        let earliest_start = graph
            .predecessors(node)
            .iter()
            .map(|&p| timings[p as usize].earliest_finish)
            .fold(0.0_f64, f64::max);
        let timing = &mut timings[node as usize];
        timing.earliest_start = earliest_start;
        timing.earliest_finish = earliest_start + graph.cost(node);
    }

    let critical_path_length = timings
        .iter()
        .map(|t| t.earliest_finish)
        .fold(0.0_f64, f64::max);

    // Backward pass
    for &node in topo_order.iter().rev() {
        let latest_finish = graph
            .successors(node)
            .iter()
            .map(|&s| timings[s as usize].latest_start)
            .fold(critical_path_length, f64::min);
        let timing = &mut timings[node as usize];
        timing.latest_finish = latest_finish;
        timing.latest_start = latest_finish - graph.cost(node);
        timing.slack = timing.latest_start - timing.earliest_start;
    }

    // Convert back to strings for return
    let mut instance_timings: FxHashMap<String, InstanceTiming> =
        FxHashMap::with_capacity_and_hasher(n, Default::default());
    let mut critical_instances: FxHashSet<String> = FxHashSet::default();
    for (node, id) in graph.instances() {
        let timing = timings[node as usize];
        log_debug!(
            verbosity,
            "{}: es={} ls={} slack={}",
            id,
            timing.earliest_start,
            timing.latest_start,
            timing.slack
        );
        if timing.is_critical(tolerance) {
            critical_instances.insert(id.to_string());
        }
        instance_timings.insert(id.to_string(), timing);
    }

    Ok(CriticalPathResult {
        instance_timings,
        critical_instances,
        critical_path_length,
        total_work: graph.total_work(),
    })
}

/// Kahn's algorithm; ready nodes are taken lowest node id (table order) first.
fn topological_sort(graph: &SimulationGraph) -> Result<Vec<NodeId>, CriticalPathError> {
    let n = graph.node_count();
    let mut in_degree: Vec<usize> = (0..n as NodeId)
        .map(|node| graph.predecessors(node).len())
        .collect();

    let mut ready: BinaryHeap<Reverse<NodeId>> = (0..n as NodeId)
        .filter(|&node| in_degree[node as usize] == 0)
        .map(Reverse)
        .collect();

    let mut result: Vec<NodeId> = Vec::with_capacity(n);
    while let Some(Reverse(node)) = ready.pop() {
        result.push(node);
        for &dependent in graph.successors(node) {
            let idx = dependent as usize;
            in_degree[idx] -= 1;
            if in_degree[idx] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if result.len() != n {
        let instances = (0..n as NodeId)
            .filter(|&node| in_degree[node as usize] > 0)
            .filter_map(|node| graph.instance_id(node).map(str::to_string))
            .collect();
        return Err(CriticalPathError::Cycle { instances });
    }

    Ok(result)
}
