//! Configuration for a critical path analysis run.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for trace flattening, dependency inference and slack evaluation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisConfig {
    /// Verbosity level: 0=silent, 1=warnings, 2=stages, 3=debug.
    pub verbosity: u8,
    /// Absolute tolerance for time comparisons and zero-slack detection.
    pub tolerance: f64,
    /// Fail on unmatched START entries instead of excluding them.
    pub strict_trace: bool,
    /// Project model-level (sequence / loop) edges onto instances.
    pub structural: bool,
    /// Infer edges from container-level start conditions.
    pub start_events: bool,
    /// Infer edges from bounded resource contention.
    pub resource_capacity: bool,
    /// Infer edges from explicit wait markers.
    pub waits: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            tolerance: 1e-6,
            strict_trace: true,
            structural: true,
            start_events: true,
            resource_capacity: true,
            waits: true,
        }
    }
}

impl AnalysisConfig {
    /// `a` and `b` denote the same instant.
    #[inline]
    pub fn same_time(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance
    }

    /// `a` happens no later than `b`.
    #[inline]
    pub fn not_after(&self, a: f64, b: f64) -> bool {
        a <= b + self.tolerance
    }
}
