//! Projection of model-level edges onto recorded instances.
//!
//! For a model edge (A, B), the instances of A are walked in start order and
//! each is matched to the earliest not-yet-claimed instance of B that starts
//! at or after it ends. The cursor into B only moves forward, so a loop
//! `A -> B -> A` unrolls into `A#0 -> B#0 -> A#1 -> B#1 -> ...`.
//!
//! Timestamps alone cannot order zero-duration instances at the same instant,
//! so a candidate must also have been opened after `from` closed in the log.

use crate::config::AnalysisConfig;
use crate::model_graph::ModelDependencyGraph;
use crate::models::RecordedActivity;
use crate::recorded::RecordedActivityTable;

use super::InstancePair;

/// Instance-level dependencies implied by the static activity structure.
pub fn structural_dependencies(
    table: &RecordedActivityTable,
    graph: &ModelDependencyGraph,
    config: &AnalysisConfig,
) -> Vec<InstancePair> {
    let by_activity = table.normal_by_activity();
    let mut pairs = Vec::new();

    for edge in &graph.edges {
        let (Some(froms), Some(tos)) = (
            by_activity.get(edge.from.as_str()),
            by_activity.get(edge.to.as_str()),
        ) else {
            continue;
        };
        project_edge(froms, tos, config, &mut pairs);
    }

    pairs
}

/// `to` began after `from` ended, in time and in log order.
fn follows(from: &RecordedActivity, to: &RecordedActivity, config: &AnalysisConfig) -> bool {
    config.not_after(from.end, to.start) && to.start_seq >= from.end_seq
}

fn project_edge(
    froms: &[&RecordedActivity],
    tos: &[&RecordedActivity],
    config: &AnalysisConfig,
    pairs: &mut Vec<InstancePair>,
) {
    let mut cursor = 0;
    for from in froms {
        while cursor < tos.len() && !follows(from, tos[cursor], config) {
            cursor += 1;
        }
        // A self-loop must not pair an instance with itself
        let mut next = cursor;
        while next < tos.len() && tos[next].id == from.id {
            next += 1;
        }
        let Some(to) = tos.get(next) else {
            break;
        };
        pairs.push((from.id.clone(), to.id.clone()));
        cursor = next + 1;
    }
}
