//! Critical path analysis of a completed simulation.
//!
//! `CriticalPathAnalysis` owns the inputs of one run and computes each stage
//! on first request: the recorded activity table, the model dependency graph,
//! the inferred dependency list and finally the critical path table. Stages
//! are cached, so repeated calls return identical results.

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::critical_path::{
    calculate_critical_path, CriticalPathError, CriticalPathResult, SimulationGraph,
};
use crate::dependencies::{infer_dependencies, InferenceContext};
use crate::log_stage;
use crate::model_graph::{ModelDependencyGraph, ModelGraphError};
use crate::models::{
    ActivityDefinition, CriticalPathRow, Dependency, LogEvent, SimTime, SimulationObject,
};
use crate::recorded::{
    RecordedActivityBuilder, RecordedActivityTable, TraceError, UnmatchedStart,
};

/// Any error that aborts an analysis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid activity configuration: {0}")]
    ModelGraph(#[from] ModelGraphError),
    #[error("inconsistent trace: {0}")]
    Trace(#[from] TraceError),
    #[error("inconsistent trace: {0}")]
    CriticalPath(#[from] CriticalPathError),
}

/// Everything the simulation produced that the analysis reads.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisInput {
    /// Simulation clock when the run ended.
    pub final_time: SimTime,
    /// Log entries of every activity and every simulation object.
    pub events: Vec<LogEvent>,
    /// Top-level activities of the model.
    pub activities: Vec<ActivityDefinition>,
    pub objects: Vec<SimulationObject>,
}

/// Analysis context for a single simulation result.
#[derive(Clone, Debug)]
pub struct CriticalPathAnalysis {
    input: AnalysisInput,
    config: AnalysisConfig,
    model_graph: Option<ModelDependencyGraph>,
    recorded: Option<RecordedActivityTable>,
    /// Starts excluded from `recorded` in lenient mode.
    unmatched: Vec<UnmatchedStart>,
    dependencies: Option<Vec<Dependency>>,
    critical_path: Option<CriticalPathResult>,
    critical_rows: Option<Vec<CriticalPathRow>>,
}

impl CriticalPathAnalysis {
    pub fn new(input: AnalysisInput, config: AnalysisConfig) -> Self {
        Self {
            input,
            config,
            model_graph: None,
            recorded: None,
            unmatched: Vec::new(),
            dependencies: None,
            critical_path: None,
            critical_rows: None,
        }
    }

    /// Recorded activity instances in (start, end) order.
    pub fn get_recorded_activity_table(&mut self) -> Result<&RecordedActivityTable, AnalysisError> {
        let table = match self.recorded.take() {
            Some(table) => table,
            None => {
                let build = RecordedActivityBuilder::new(&self.input.activities, &self.config)
                    .finish(&self.input.events, self.input.final_time)?;
                self.unmatched = build.unmatched;
                build.table
            }
        };
        let table: &RecordedActivityTable = self.recorded.insert(table);
        Ok(table)
    }

    /// START entries left out of the table because the trace never closed them.
    ///
    /// Always empty with `strict_trace`, which fails the analysis instead.
    pub fn unmatched_starts(&mut self) -> Result<&[UnmatchedStart], AnalysisError> {
        self.get_recorded_activity_table()?;
        Ok(&self.unmatched)
    }

    /// Logical dependencies between base activity definitions.
    pub fn model_dependency_graph(&mut self) -> Result<&ModelDependencyGraph, AnalysisError> {
        let graph = match self.model_graph.take() {
            Some(graph) => graph,
            None => {
                let graph = ModelDependencyGraph::build(&self.input.activities)?;
                log_stage!(
                    self.config.verbosity,
                    "model graph: {} base activities, {} edges",
                    graph.nodes.len(),
                    graph.edges.len()
                );
                graph
            }
        };
        let graph: &ModelDependencyGraph = self.model_graph.insert(graph);
        Ok(graph)
    }

    /// Deduplicated instance-level dependencies from every enabled extractor.
    pub fn get_dependency_list(&mut self) -> Result<&[Dependency], AnalysisError> {
        if self.dependencies.is_none() {
            self.get_recorded_activity_table()?;
            self.model_dependency_graph()?;
            let dependencies = match (&self.recorded, &self.model_graph) {
                (Some(table), Some(model_graph)) => infer_dependencies(&InferenceContext {
                    table,
                    model_graph,
                    activities: &self.input.activities,
                    objects: &self.input.objects,
                    config: &self.config,
                }),
                _ => Vec::new(),
            };
            self.dependencies = Some(dependencies);
        }
        Ok(self.dependencies.as_deref().unwrap_or_default())
    }

    /// The recorded activity table with slack and criticality per instance.
    pub fn get_critical_path_table(&mut self) -> Result<&[CriticalPathRow], AnalysisError> {
        if self.critical_rows.is_none() {
            self.get_dependency_list()?;
            if let (Some(table), Some(dependencies)) = (&self.recorded, &self.dependencies) {
                let result = compute_critical_path(table, dependencies, &self.config)?;
                self.critical_rows = Some(critical_path_rows(table, &result));
                self.critical_path = Some(result);
            }
        }
        Ok(self.critical_rows.as_deref().unwrap_or_default())
    }

    /// Overall duration implied by the dependency graph.
    pub fn makespan(&mut self) -> Result<f64, AnalysisError> {
        self.get_critical_path_table()?;
        Ok(self
            .critical_path
            .as_ref()
            .map(|r| r.critical_path_length)
            .unwrap_or(0.0))
    }
}

/// Build the simulation graph and run the forward and backward passes.
pub fn compute_critical_path(
    table: &RecordedActivityTable,
    dependencies: &[Dependency],
    config: &AnalysisConfig,
) -> Result<CriticalPathResult, AnalysisError> {
    let graph = SimulationGraph::build(table, dependencies);
    log_stage!(
        config.verbosity,
        "simulation graph: {} instances, {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    let result = calculate_critical_path(&graph, config.tolerance, config.verbosity)?;
    log_stage!(
        config.verbosity,
        "critical path: {} of {} instances critical, makespan {}",
        result.critical_instances.len(),
        graph.node_count(),
        result.critical_path_length
    );
    Ok(result)
}

/// Join the table with its timings, keeping table order.
pub fn critical_path_rows(
    table: &RecordedActivityTable,
    result: &CriticalPathResult,
) -> Vec<CriticalPathRow> {
    table
        .rows()
        .iter()
        .map(|row| {
            let timing = result.timing(&row.id).copied().unwrap_or_default();
            CriticalPathRow {
                id: row.id.clone(),
                activity_id: row.activity_id.clone(),
                name: row.name.clone(),
                start: row.start,
                end: row.end,
                kind: row.kind,
                earliest_start: timing.earliest_start,
                latest_start: timing.latest_start,
                slack: timing.slack,
                is_critical: result.is_critical(&row.id),
            }
        })
        .collect()
}

/// Run the whole pipeline once and return the critical path table.
pub fn analyze(
    input: AnalysisInput,
    config: AnalysisConfig,
) -> Result<Vec<CriticalPathRow>, AnalysisError> {
    let mut analysis = CriticalPathAnalysis::new(input, config);
    Ok(analysis.get_critical_path_table()?.to_vec())
}
