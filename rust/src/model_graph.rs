//! Model-level dependency graph between base activity definitions.
//!
//! Composite activities are recursively replaced by the subgraphs of their
//! children until only base activities remain:
//!
//! - Sequential `C1..Cn`: edges from the last leaves of `Ci` to the first
//!   leaves of `Ci+1`.
//! - Parallel / other structural: children side by side, no edges.
//! - While / Repeat: the child's subgraph plus a back-edge from its last
//!   leaves to its first leaves. This is the only source of cycles.
//!
//! For `While(Sequential(A, B, C))` the result is `A -> B -> C -> A`.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::models::{ActivityDefinition, ActivityKind};

/// Errors raised while expanding the definition tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelGraphError {
    #[error("in {parent_kind} activity '{parent}' the sub process '{child}' must have postpone_start=true")]
    PostponeStartRequired {
        parent: String,
        parent_kind: &'static str,
        child: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelEdgeKind {
    /// Ordering inside a sequential activity.
    Sequence,
    /// Back-edge of a repeating activity.
    Recurrence,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelEdge {
    pub from: String,
    pub to: String,
    pub kind: ModelEdgeKind,
}

/// Directed graph over base activity ids. May contain cycles.
#[derive(Clone, Debug, Default)]
pub struct ModelDependencyGraph {
    /// Base activity ids in first-seen order.
    pub nodes: Vec<String>,
    /// Edges in insertion order, unique by (from, to).
    pub edges: Vec<ModelEdge>,
    edge_set: FxHashSet<(String, String)>,
    node_set: FxHashSet<String>,
}

/// First and last leaves of an expanded subgraph.
#[derive(Default)]
struct Frontier {
    first: Vec<String>,
    last: Vec<String>,
}

impl Frontier {
    fn is_empty(&self) -> bool {
        self.first.is_empty()
    }
}

fn kind_name(kind: &ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Base => "base",
        ActivityKind::Sequential(_) => "sequential",
        ActivityKind::Parallel(_) => "parallel",
        ActivityKind::While(_) => "while",
        ActivityKind::Repeat { .. } => "repeat",
        ActivityKind::Structural(_) => "structural",
    }
}

impl ModelDependencyGraph {
    /// Build the graph from the top-level activities of a model.
    pub fn build(main_activities: &[ActivityDefinition]) -> Result<Self, ModelGraphError> {
        let mut graph = Self::default();
        for activity in main_activities {
            graph.expand(activity)?;
        }
        Ok(graph)
    }

    /// Logical (from, to) pairs of activity ids.
    pub fn dependency_list(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect()
    }

    pub fn base_activities(&self) -> &[String] {
        &self.nodes
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_set.contains(id)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edge_set
            .contains(&(from.to_string(), to.to_string()))
    }

    fn add_node(&mut self, id: &str) {
        if self.node_set.insert(id.to_string()) {
            self.nodes.push(id.to_string());
        }
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: ModelEdgeKind) {
        if self.edge_set.insert((from.to_string(), to.to_string())) {
            self.edges.push(ModelEdge {
                from: from.to_string(),
                to: to.to_string(),
                kind,
            });
        }
    }

    fn connect(&mut self, from: &[String], to: &[String], kind: ModelEdgeKind) {
        for f in from {
            for t in to {
                self.add_edge(f, t, kind);
            }
        }
    }

    /// Replace `activity` by its subgraph and return the subgraph's frontier.
    fn expand(&mut self, activity: &ActivityDefinition) -> Result<Frontier, ModelGraphError> {
        if !activity.is_base() {
            for child in activity.sub_processes() {
                if !child.postpone_start {
                    return Err(ModelGraphError::PostponeStartRequired {
                        parent: activity.name.clone(),
                        parent_kind: kind_name(&activity.kind),
                        child: child.name.clone(),
                    });
                }
            }
        }

        match &activity.kind {
            ActivityKind::Base => {
                self.add_node(&activity.id);
                Ok(Frontier {
                    first: vec![activity.id.clone()],
                    last: vec![activity.id.clone()],
                })
            }
            ActivityKind::Sequential(children) => {
                let mut frontier = Frontier::default();
                for child in children {
                    let sub = self.expand(child)?;
                    // Empty composites contribute no leaves to chain through
                    if sub.is_empty() {
                        continue;
                    }
                    if frontier.is_empty() {
                        frontier = sub;
                    } else {
                        self.connect(&frontier.last, &sub.first, ModelEdgeKind::Sequence);
                        frontier.last = sub.last;
                    }
                }
                Ok(frontier)
            }
            ActivityKind::Parallel(children) | ActivityKind::Structural(children) => {
                let mut frontier = Frontier::default();
                for child in children {
                    let sub = self.expand(child)?;
                    frontier.first.extend(sub.first);
                    frontier.last.extend(sub.last);
                }
                Ok(frontier)
            }
            ActivityKind::While(child) => self.expand_recurring(child),
            ActivityKind::Repeat {
                sub_process,
                repetitions,
            } => {
                if *repetitions <= 1 {
                    self.expand(sub_process)
                } else {
                    self.expand_recurring(sub_process)
                }
            }
        }
    }

    fn expand_recurring(
        &mut self,
        child: &ActivityDefinition,
    ) -> Result<Frontier, ModelGraphError> {
        let sub = self.expand(child)?;
        self.connect(&sub.last, &sub.first, ModelEdgeKind::Recurrence);
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> ActivityDefinition {
        ActivityDefinition::base(id, &id.to_uppercase()).postponed()
    }

    fn edges(graph: &ModelDependencyGraph) -> Vec<(&str, &str)> {
        graph
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect()
    }

    #[test]
    fn test_single_base_activity() {
        let graph = ModelDependencyGraph::build(&[ActivityDefinition::base("a", "A")]).unwrap();
        assert_eq!(graph.nodes, vec!["a"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_sequential_chain() {
        let seq = ActivityDefinition::sequential("s", "S", vec![leaf("a"), leaf("b"), leaf("c")]);
        let graph = ModelDependencyGraph::build(&[seq]).unwrap();

        assert_eq!(graph.nodes, vec!["a", "b", "c"]);
        assert_eq!(edges(&graph), vec![("a", "b"), ("b", "c")]);
        // Composite nodes do not survive expansion
        assert!(!graph.contains_node("s"));
    }

    #[test]
    fn test_parallel_has_no_edges() {
        let par = ActivityDefinition::parallel("p", "P", vec![leaf("a"), leaf("b")]);
        let graph = ModelDependencyGraph::build(&[par]).unwrap();
        assert_eq!(graph.nodes, vec!["a", "b"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_while_adds_back_edge() {
        let seq = ActivityDefinition::sequential("s", "S", vec![leaf("a"), leaf("b"), leaf("c")])
            .postponed();
        let looped = ActivityDefinition::while_loop("w", "W", seq);
        let graph = ModelDependencyGraph::build(&[looped]).unwrap();

        assert_eq!(edges(&graph), vec![("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(graph.edges[2].kind, ModelEdgeKind::Recurrence);
    }

    #[test]
    fn test_while_single_base_self_loop() {
        let looped = ActivityDefinition::while_loop("w", "W", leaf("a"));
        let graph = ModelDependencyGraph::build(&[looped]).unwrap();
        assert_eq!(edges(&graph), vec![("a", "a")]);
    }

    #[test]
    fn test_sequence_into_parallel_fans_out_and_in() {
        // a -> (b | c) -> d
        let par = ActivityDefinition::parallel("p", "P", vec![leaf("b"), leaf("c")]).postponed();
        let seq = ActivityDefinition::sequential("s", "S", vec![leaf("a"), par, leaf("d")]);
        let graph = ModelDependencyGraph::build(&[seq]).unwrap();

        assert_eq!(
            edges(&graph),
            vec![("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]
        );
    }

    #[test]
    fn test_repeat_once_has_no_back_edge() {
        let once = ActivityDefinition::repeat("r", "R", leaf("a"), 1);
        let graph = ModelDependencyGraph::build(&[once]).unwrap();
        assert!(graph.edges.is_empty());

        let thrice = ActivityDefinition::repeat("r", "R", leaf("a"), 3);
        let graph = ModelDependencyGraph::build(&[thrice]).unwrap();
        assert!(graph.has_edge("a", "a"));
    }

    #[test]
    fn test_empty_sequential_child_is_skipped() {
        let empty = ActivityDefinition::parallel("p", "P", vec![]).postponed();
        let seq = ActivityDefinition::sequential("s", "S", vec![leaf("a"), empty, leaf("b")]);
        let graph = ModelDependencyGraph::build(&[seq]).unwrap();
        assert_eq!(edges(&graph), vec![("a", "b")]);
    }

    #[test]
    fn test_child_without_postpone_start_is_rejected() {
        let eager = ActivityDefinition::base("b", "B");
        let seq = ActivityDefinition::sequential("s", "Main", vec![leaf("a"), eager]);
        let err = ModelDependencyGraph::build(&[seq]).unwrap_err();

        assert_eq!(
            err,
            ModelGraphError::PostponeStartRequired {
                parent: "Main".to_string(),
                parent_kind: "sequential",
                child: "B".to_string(),
            }
        );
        assert!(err.to_string().contains("postpone_start=true"));
    }

    #[test]
    fn test_dependency_list() {
        let seq = ActivityDefinition::sequential("s", "S", vec![leaf("a"), leaf("b")]);
        let graph = ModelDependencyGraph::build(&[seq]).unwrap();
        assert_eq!(
            graph.dependency_list(),
            vec![("a".to_string(), "b".to_string())]
        );
        assert_eq!(graph.base_activities(), &["a".to_string(), "b".to_string()]);
    }
}
