//! Core data types for trace analysis.
//!
//! Inputs (activity definitions, log events, simulation objects) are produced
//! by the simulation engine and model layer; outputs (recorded activities,
//! dependencies, critical path rows) are derived by this crate.

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Simulation time in seconds.
pub type SimTime = f64;

/// Convert a simulation timestamp (epoch seconds) to wall-clock time.
pub fn sim_time_to_datetime(t: SimTime) -> Option<DateTime<Utc>> {
    if !t.is_finite() {
        return None;
    }
    let secs = t.floor();
    let nanos = ((t - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

// ---------------------------------------------------------------------------
// Activity definitions
// ---------------------------------------------------------------------------

/// Comparison applied to a container level by a start condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LevelComparison {
    Ge,
    Gt,
    Le,
    Lt,
}

impl LevelComparison {
    pub fn holds(self, level: f64, threshold: f64) -> bool {
        match self {
            Self::Ge => level >= threshold,
            Self::Gt => level > threshold,
            Self::Le => level <= threshold,
            Self::Lt => level < threshold,
        }
    }
}

/// Condition gating the start of an activity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StartCondition {
    /// Container level of `object_id` compared against `level`.
    ContainerLevel {
        object_id: String,
        comparison: LevelComparison,
        level: f64,
    },
    /// Container of `object_id` is filled to capacity.
    ContainerFull { object_id: String },
    /// Container of `object_id` holds nothing.
    ContainerEmpty { object_id: String },
    /// Another activity reached `state` (e.g. "done").
    ActivityState { activity_id: String, state: String },
    All(Vec<StartCondition>),
    Any(Vec<StartCondition>),
    /// Anything the model layer supports that this crate does not know.
    Other(String),
}

impl StartCondition {
    /// Short type name used in log output.
    pub fn type_name(&self) -> &str {
        match self {
            Self::ContainerLevel { .. } => "container_level",
            Self::ContainerFull { .. } => "container_full",
            Self::ContainerEmpty { .. } => "container_empty",
            Self::ActivityState { .. } => "activity",
            Self::All(_) => "and",
            Self::Any(_) => "or",
            Self::Other(name) => name,
        }
    }
}

/// Kind of an activity plus its kind-specific payload.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActivityKind {
    /// Does actual work; a single node in the model graph.
    Base,
    /// Children executed in order.
    Sequential(Vec<ActivityDefinition>),
    /// Children executed concurrently.
    Parallel(Vec<ActivityDefinition>),
    /// Child repeated until a stop condition holds.
    While(Box<ActivityDefinition>),
    /// Child repeated a fixed number of times.
    Repeat {
        sub_process: Box<ActivityDefinition>,
        repetitions: u32,
    },
    /// Any other composite; children are treated as unordered.
    Structural(Vec<ActivityDefinition>),
}

/// Static, pre-simulation description of an activity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivityDefinition {
    pub id: String,
    pub name: String,
    /// The activity does not begin until externally triggered.
    pub postpone_start: bool,
    pub start_condition: Option<StartCondition>,
    pub kind: ActivityKind,
}

impl ActivityDefinition {
    pub fn base(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            postpone_start: false,
            start_condition: None,
            kind: ActivityKind::Base,
        }
    }

    pub fn sequential(id: &str, name: &str, sub_processes: Vec<ActivityDefinition>) -> Self {
        Self {
            kind: ActivityKind::Sequential(sub_processes),
            ..Self::base(id, name)
        }
    }

    pub fn parallel(id: &str, name: &str, sub_processes: Vec<ActivityDefinition>) -> Self {
        Self {
            kind: ActivityKind::Parallel(sub_processes),
            ..Self::base(id, name)
        }
    }

    pub fn while_loop(id: &str, name: &str, sub_process: ActivityDefinition) -> Self {
        Self {
            kind: ActivityKind::While(Box::new(sub_process)),
            ..Self::base(id, name)
        }
    }

    pub fn repeat(id: &str, name: &str, sub_process: ActivityDefinition, repetitions: u32) -> Self {
        Self {
            kind: ActivityKind::Repeat {
                sub_process: Box::new(sub_process),
                repetitions,
            },
            ..Self::base(id, name)
        }
    }

    /// Mark as started by its parent rather than immediately.
    pub fn postponed(mut self) -> Self {
        self.postpone_start = true;
        self
    }

    pub fn with_start_condition(mut self, condition: StartCondition) -> Self {
        self.start_condition = Some(condition);
        self
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, ActivityKind::Base)
    }

    /// Direct children, in definition order.
    pub fn sub_processes(&self) -> Vec<&ActivityDefinition> {
        match &self.kind {
            ActivityKind::Base => Vec::new(),
            ActivityKind::Sequential(children)
            | ActivityKind::Parallel(children)
            | ActivityKind::Structural(children) => children.iter().collect(),
            ActivityKind::While(child) => vec![child.as_ref()],
            ActivityKind::Repeat { sub_process, .. } => vec![sub_process.as_ref()],
        }
    }

    /// Depth-first walk over this definition and all descendants.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ActivityDefinition)) {
        visit(self);
        for child in self.sub_processes() {
            child.walk(visit);
        }
    }
}

// ---------------------------------------------------------------------------
// Raw log
// ---------------------------------------------------------------------------

/// State recorded by a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LogState {
    Start,
    Stop,
    WaitStart,
    WaitStop,
}

impl LogState {
    /// Parse the engine's textual state ("START", "WAIT_STOP", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "START" => Some(Self::Start),
            "STOP" => Some(Self::Stop),
            "WAIT_START" => Some(Self::WaitStart),
            "WAIT_STOP" => Some(Self::WaitStop),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LabelKind {
    SubProcess,
    Resource,
    Other,
}

/// Optional context attached to a log entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivityLabel {
    pub kind: LabelKind,
    pub reference: String,
}

impl ActivityLabel {
    pub fn sub_process(reference: &str) -> Self {
        Self {
            kind: LabelKind::SubProcess,
            reference: reference.to_string(),
        }
    }

    pub fn resource(reference: &str) -> Self {
        Self {
            kind: LabelKind::Resource,
            reference: reference.to_string(),
        }
    }
}

/// Whose log an entry was written to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LogSource {
    Activity,
    Object(String),
}

/// One row emitted by the simulation engine.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogEvent {
    pub timestamp: SimTime,
    pub activity_id: String,
    pub state: LogState,
    pub label: Option<ActivityLabel>,
    pub source: LogSource,
}

impl LogEvent {
    pub fn new(timestamp: SimTime, activity_id: &str, state: LogState) -> Self {
        Self {
            timestamp,
            activity_id: activity_id.to_string(),
            state,
            label: None,
            source: LogSource::Activity,
        }
    }

    pub fn with_label(mut self, label: ActivityLabel) -> Self {
        self.label = Some(label);
        self
    }

    /// Attribute the entry to a simulation object's log.
    pub fn in_object_log(mut self, object_id: &str) -> Self {
        self.source = LogSource::Object(object_id.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Simulation objects
// ---------------------------------------------------------------------------

/// Container of a simulation object with its recorded level history.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContainerState {
    pub capacity: f64,
    /// (time, level) pairs; each pair is the level from `time` onward.
    pub level_history: Vec<(SimTime, f64)>,
}

/// A simulation object (site, vessel, equipment) as seen after simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationObject {
    pub id: String,
    pub name: String,
    /// Number of concurrent users the object's resource admits.
    pub resource_capacity: Option<u32>,
    pub container: Option<ContainerState>,
}

impl SimulationObject {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            resource_capacity: None,
            container: None,
        }
    }

    pub fn with_resource_capacity(mut self, capacity: u32) -> Self {
        self.resource_capacity = Some(capacity);
        self
    }

    pub fn with_container(mut self, capacity: f64, level_history: Vec<(SimTime, f64)>) -> Self {
        self.container = Some(ContainerState {
            capacity,
            level_history,
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Derived entities
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstanceKind {
    Normal,
    Wait,
}

/// One concrete timed execution of an activity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordedActivity {
    /// Deterministic instance id, unique within a table.
    pub id: String,
    pub activity_id: String,
    pub name: String,
    pub label: Option<ActivityLabel>,
    /// Position among instances sharing activity, label and kind.
    pub ordinal: usize,
    pub start: SimTime,
    pub end: SimTime,
    pub kind: InstanceKind,
    /// Ids of simulation objects whose logs record this instance, sorted.
    pub objects: Vec<String>,
    /// Position of the opening entry in the time-ordered log.
    pub start_seq: usize,
    /// Position of the closing entry in the time-ordered log.
    pub end_seq: usize,
}

impl RecordedActivity {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_wait(&self) -> bool {
        self.kind == InstanceKind::Wait
    }

    pub fn involves(&self, object_id: &str) -> bool {
        self.objects.iter().any(|o| o == object_id)
    }
}

/// Evidence behind a dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DependencySource {
    Structural,
    StartEvent,
    ResourceCapacity,
    Wait,
}

/// `to` cannot start before `from` ends.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dependency {
    pub from: String,
    pub to: String,
    pub from_activity: String,
    pub to_activity: String,
    /// Every extractor that asserted this pair, sorted and unique.
    pub sources: Vec<DependencySource>,
}

impl Dependency {
    pub fn pair(&self) -> (&str, &str) {
        (&self.from, &self.to)
    }

    pub fn activity_pair(&self) -> (&str, &str) {
        (&self.from_activity, &self.to_activity)
    }
}

/// A recorded activity with its slack analysis.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CriticalPathRow {
    pub id: String,
    pub activity_id: String,
    pub name: String,
    pub start: SimTime,
    pub end: SimTime,
    pub kind: InstanceKind,
    pub earliest_start: f64,
    pub latest_start: f64,
    pub slack: f64,
    pub is_critical: bool,
}

impl CriticalPathRow {
    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        sim_time_to_datetime(self.start)
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        sim_time_to_datetime(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_state_parse() {
        assert_eq!(LogState::parse("START"), Some(LogState::Start));
        assert_eq!(LogState::parse("stop"), Some(LogState::Stop));
        assert_eq!(LogState::parse("WAIT_START"), Some(LogState::WaitStart));
        assert_eq!(LogState::parse("wait-stop"), Some(LogState::WaitStop));
        assert_eq!(LogState::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_level_comparison() {
        assert!(LevelComparison::Ge.holds(5.0, 5.0));
        assert!(!LevelComparison::Gt.holds(5.0, 5.0));
        assert!(LevelComparison::Le.holds(0.0, 0.0));
        assert!(LevelComparison::Lt.holds(-1.0, 0.0));
    }

    #[test]
    fn test_sub_processes_by_kind() {
        let a = ActivityDefinition::base("a", "A").postponed();
        let b = ActivityDefinition::base("b", "B").postponed();
        let seq = ActivityDefinition::sequential("s", "S", vec![a.clone(), b]);
        assert_eq!(seq.sub_processes().len(), 2);
        assert!(a.sub_processes().is_empty());

        let looped = ActivityDefinition::while_loop("w", "W", seq.clone().postponed());
        assert_eq!(looped.sub_processes()[0].id, "s");

        let mut ids = Vec::new();
        looped.walk(&mut |d| ids.push(d.id.clone()));
        assert_eq!(ids, vec!["w", "s", "a", "b"]);
    }

    #[test]
    fn test_sim_time_to_datetime() {
        let dt = sim_time_to_datetime(1_700_000_000.5).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert!(sim_time_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn test_critical_path_row_datetimes() {
        let row = CriticalPathRow {
            id: "a#0".to_string(),
            activity_id: "a".to_string(),
            name: "A".to_string(),
            start: 60.0,
            end: 3_600.0,
            kind: InstanceKind::Normal,
            earliest_start: 0.0,
            latest_start: 0.0,
            slack: 0.0,
            is_critical: true,
        };
        assert_eq!(row.start_datetime().unwrap().timestamp(), 60);
        assert_eq!(
            row.end_datetime().unwrap() - row.start_datetime().unwrap(),
            chrono::Duration::seconds(3_540)
        );
    }
}
