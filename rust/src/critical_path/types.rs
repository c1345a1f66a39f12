//! Types for critical path computation.

/// Per-instance timing information from the forward and backward passes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InstanceTiming {
    /// Earliest possible start time (from forward pass).
    pub earliest_start: f64,
    /// Earliest possible finish time (from forward pass).
    pub earliest_finish: f64,
    /// Latest allowable start time (from backward pass).
    pub latest_start: f64,
    /// Latest allowable finish time (from backward pass).
    pub latest_finish: f64,
    /// Slack = latest_start - earliest_start.
    pub slack: f64,
}

impl InstanceTiming {
    /// Zero slack within `tolerance`.
    pub fn is_critical(&self, tolerance: f64) -> bool {
        self.slack.abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_timing_critical() {
        let timing = InstanceTiming {
            earliest_start: 0.0,
            earliest_finish: 5.0,
            latest_start: 0.0,
            latest_finish: 5.0,
            slack: 0.0,
        };
        assert!(timing.is_critical(1e-6));

        let timing_with_slack = InstanceTiming {
            earliest_start: 0.0,
            earliest_finish: 5.0,
            latest_start: 2.0,
            latest_finish: 7.0,
            slack: 2.0,
        };
        assert!(!timing_with_slack.is_critical(1e-6));

        // Float noise from the backward pass still counts as zero slack
        let noisy = InstanceTiming {
            slack: 1e-9,
            ..timing
        };
        assert!(noisy.is_critical(1e-6));
    }
}
