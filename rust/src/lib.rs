//! Critical path analysis of discrete-event simulation traces.
//!
//! Flattens the raw event log into recorded activity instances, infers
//! dependencies between them from the model structure, start conditions,
//! resource contention and wait markers, and marks every instance with zero
//! slack as critical.

pub mod analysis;
pub mod config;
pub mod critical_path;
pub mod dependencies;
pub mod interner;
pub mod logging;
pub mod model_graph;
pub mod models;
pub mod recorded;

#[cfg(feature = "python")]
mod python;

pub use analysis::{analyze, AnalysisError, AnalysisInput, CriticalPathAnalysis};
pub use config::AnalysisConfig;
pub use critical_path::{
    calculate_critical_path, CriticalPathError, CriticalPathResult, InstanceTiming,
    SimulationGraph,
};
pub use dependencies::{infer_dependencies, InferenceContext};
pub use model_graph::{ModelDependencyGraph, ModelEdge, ModelEdgeKind, ModelGraphError};
pub use models::{
    ActivityDefinition, ActivityKind, ActivityLabel, ContainerState, CriticalPathRow, Dependency,
    DependencySource, InstanceKind, LabelKind, LevelComparison, LogEvent, LogSource, LogState,
    RecordedActivity, SimTime, SimulationObject, StartCondition,
};
pub use recorded::{
    RecordedActivityBuilder, RecordedActivityTable, TraceError, UnmatchedStart,
};
