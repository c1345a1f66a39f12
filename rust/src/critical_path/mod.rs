//! Critical path over recorded activity instances.
//!
//! Instances and their inferred dependencies form a DAG weighted by instance
//! duration. A forward pass gives earliest starts, a backward pass from the
//! sinks gives latest starts, and every zero-slack instance is critical.

mod calculation;
mod graph;
mod types;

pub use calculation::{calculate_critical_path, CriticalPathError, CriticalPathResult};
pub use graph::SimulationGraph;
pub use types::InstanceTiming;
