//! Dependency inference between recorded activity instances.
//!
//! Four independent extractors each read the same immutable inputs and
//! return asserted `(from, to)` instance pairs:
//!
//! - structural: model-level sequence and loop edges projected onto instances
//! - start events: container-level start conditions (other conditions skipped)
//! - resource capacity: FIFO replay of bounded resources at each object
//! - waits: explicit wait markers released by another instance
//!
//! None of them fails on incomplete data; they assert fewer pairs instead.
//! The final set is the union of all assertions, deduplicated by pair.

mod occupancy;
mod resource_capacity;
mod start_event;
mod structural;
mod wait;

pub use occupancy::ResourceOccupancy;
pub use resource_capacity::resource_capacity_dependencies;
pub use start_event::start_event_dependencies;
pub use structural::structural_dependencies;
pub use wait::wait_dependencies;

use rustc_hash::FxHashMap;

use crate::config::AnalysisConfig;
use crate::model_graph::ModelDependencyGraph;
use crate::models::{ActivityDefinition, Dependency, DependencySource, SimulationObject};
use crate::recorded::RecordedActivityTable;
use crate::{log_debug, log_stage};

/// Ordered pair of instance ids: `to` waits for `from`.
pub type InstancePair = (String, String);

/// Everything an extractor may look at.
#[derive(Clone, Copy)]
pub struct InferenceContext<'a> {
    pub table: &'a RecordedActivityTable,
    pub model_graph: &'a ModelDependencyGraph,
    pub activities: &'a [ActivityDefinition],
    pub objects: &'a [SimulationObject],
    pub config: &'a AnalysisConfig,
}

/// Union of asserted pairs keyed by pair identity.
#[derive(Default)]
pub struct DependencySet {
    order: Vec<InstancePair>,
    sources: FxHashMap<InstancePair, Vec<DependencySource>>,
}

impl DependencySet {
    /// Record an assertion. Self-pairs are dropped; repeated pairs only gain a source.
    pub fn assert(&mut self, pair: InstancePair, source: DependencySource) {
        if pair.0 == pair.1 {
            return;
        }
        match self.sources.get_mut(&pair) {
            Some(sources) => {
                if !sources.contains(&source) {
                    sources.push(source);
                    sources.sort();
                }
            }
            None => {
                self.sources.insert(pair.clone(), vec![source]);
                self.order.push(pair);
            }
        }
    }

    pub fn extend(&mut self, pairs: Vec<InstancePair>, source: DependencySource) {
        for pair in pairs {
            self.assert(pair, source);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolve pairs into dependencies, in first-assertion order.
    pub fn into_dependencies(mut self, table: &RecordedActivityTable) -> Vec<Dependency> {
        self.order
            .into_iter()
            .filter_map(|pair| {
                let sources = self.sources.remove(&pair)?;
                let from_activity = table.get(&pair.0)?.activity_id.clone();
                let to_activity = table.get(&pair.1)?.activity_id.clone();
                Some(Dependency {
                    from: pair.0,
                    to: pair.1,
                    from_activity,
                    to_activity,
                    sources,
                })
            })
            .collect()
    }
}

/// Run every enabled extractor and union the results.
pub fn infer_dependencies(ctx: &InferenceContext<'_>) -> Vec<Dependency> {
    let config = ctx.config;
    let mut set = DependencySet::default();

    if config.structural {
        let pairs = structural_dependencies(ctx.table, ctx.model_graph, config);
        log_stage!(config.verbosity, "structural: {} dependencies", pairs.len());
        set.extend(pairs, DependencySource::Structural);
    }
    if config.start_events {
        let pairs = start_event_dependencies(ctx.table, ctx.activities, ctx.objects, config);
        log_stage!(config.verbosity, "start events: {} dependencies", pairs.len());
        set.extend(pairs, DependencySource::StartEvent);
    }
    if config.resource_capacity {
        let pairs = resource_capacity_dependencies(ctx.table, ctx.objects, config);
        log_stage!(config.verbosity, "resource capacity: {} dependencies", pairs.len());
        set.extend(pairs, DependencySource::ResourceCapacity);
    }
    if config.waits {
        let pairs = wait_dependencies(ctx.table, config);
        log_stage!(config.verbosity, "waits: {} dependencies", pairs.len());
        set.extend(pairs, DependencySource::Wait);
    }

    let dependencies = set.into_dependencies(ctx.table);
    for dep in &dependencies {
        log_debug!(
            config.verbosity,
            "{} -> {} {:?}",
            dep.from,
            dep.to,
            dep.sources
        );
    }
    log_stage!(
        config.verbosity,
        "{} unique dependencies after union",
        dependencies.len()
    );
    dependencies
}
