//! Python bindings.
//!
//! Thin `#[pyclass]` wrappers around the analysis inputs and outputs. Every
//! analysis error is raised as `ValueError` carrying the error's message.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::{DateTime, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::analysis::{AnalysisError, AnalysisInput, CriticalPathAnalysis};
use crate::config::AnalysisConfig;
use crate::models::{
    ActivityDefinition, ActivityKind, ActivityLabel, CriticalPathRow, Dependency, InstanceKind,
    LabelKind, LevelComparison, LogEvent, LogSource, LogState, RecordedActivity,
    SimulationObject, StartCondition,
};
use crate::recorded::UnmatchedStart;

fn to_py_err(e: AnalysisError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Analysis configuration (PyO3 wrapper).
#[pyclass(name = "AnalysisConfig")]
#[derive(Clone, Debug)]
pub struct PyAnalysisConfig {
    #[pyo3(get, set)]
    pub verbosity: u8,
    #[pyo3(get, set)]
    pub tolerance: f64,
    #[pyo3(get, set)]
    pub strict_trace: bool,
    #[pyo3(get, set)]
    pub structural: bool,
    #[pyo3(get, set)]
    pub start_events: bool,
    #[pyo3(get, set)]
    pub resource_capacity: bool,
    #[pyo3(get, set)]
    pub waits: bool,
}

#[pymethods]
impl PyAnalysisConfig {
    #[new]
    #[pyo3(signature = (
        verbosity=0,
        tolerance=1e-6,
        strict_trace=true,
        structural=true,
        start_events=true,
        resource_capacity=true,
        waits=true
    ))]
    fn new(
        verbosity: u8,
        tolerance: f64,
        strict_trace: bool,
        structural: bool,
        start_events: bool,
        resource_capacity: bool,
        waits: bool,
    ) -> Self {
        Self {
            verbosity,
            tolerance,
            strict_trace,
            structural,
            start_events,
            resource_capacity,
            waits,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "AnalysisConfig(verbosity={}, tolerance={}, strict_trace={})",
            self.verbosity, self.tolerance, self.strict_trace
        )
    }
}

impl From<&PyAnalysisConfig> for AnalysisConfig {
    fn from(c: &PyAnalysisConfig) -> Self {
        Self {
            verbosity: c.verbosity,
            tolerance: c.tolerance,
            strict_trace: c.strict_trace,
            structural: c.structural,
            start_events: c.start_events,
            resource_capacity: c.resource_capacity,
            waits: c.waits,
        }
    }
}

/// One raw log entry (PyO3 wrapper).
#[pyclass(name = "LogEvent")]
#[derive(Clone, Debug)]
pub struct PyLogEvent {
    #[pyo3(get, set)]
    pub timestamp: f64,
    #[pyo3(get, set)]
    pub activity_id: String,
    /// "START", "STOP", "WAIT_START" or "WAIT_STOP".
    #[pyo3(get, set)]
    pub state: String,
    /// "subprocess", "resource" or anything else.
    #[pyo3(get, set)]
    pub label_type: Option<String>,
    #[pyo3(get, set)]
    pub label_ref: Option<String>,
    /// Set when the entry comes from a simulation object's log.
    #[pyo3(get, set)]
    pub object_id: Option<String>,
}

#[pymethods]
impl PyLogEvent {
    #[new]
    #[pyo3(signature = (timestamp, activity_id, state, label_type=None, label_ref=None, object_id=None))]
    fn new(
        timestamp: f64,
        activity_id: String,
        state: String,
        label_type: Option<String>,
        label_ref: Option<String>,
        object_id: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            activity_id,
            state,
            label_type,
            label_ref,
            object_id,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "LogEvent(t={}, activity_id={}, state={})",
            self.timestamp, self.activity_id, self.state
        )
    }
}

impl TryFrom<&PyLogEvent> for LogEvent {
    type Error = PyErr;

    fn try_from(e: &PyLogEvent) -> PyResult<Self> {
        let state = LogState::parse(&e.state).ok_or_else(|| {
            PyValueError::new_err(format!(
                "unknown log state '{}' for activity '{}'",
                e.state, e.activity_id
            ))
        })?;
        let label = e.label_ref.as_ref().map(|reference| {
            let kind = match e
                .label_type
                .as_deref()
                .map(|t| t.to_ascii_lowercase().replace('_', ""))
                .as_deref()
            {
                Some("subprocess") => LabelKind::SubProcess,
                Some("resource") => LabelKind::Resource,
                _ => LabelKind::Other,
            };
            ActivityLabel {
                kind,
                reference: reference.clone(),
            }
        });
        Ok(LogEvent {
            timestamp: e.timestamp,
            activity_id: e.activity_id.clone(),
            state,
            label,
            source: match &e.object_id {
                Some(id) => LogSource::Object(id.clone()),
                None => LogSource::Activity,
            },
        })
    }
}

/// Start condition of an activity (PyO3 wrapper).
#[pyclass(name = "StartCondition")]
#[derive(Clone, Debug)]
pub struct PyStartCondition {
    /// "container_level", "container_full", "container_empty", "activity",
    /// "and", "or" or any other name.
    #[pyo3(get, set)]
    pub kind: String,
    #[pyo3(get, set)]
    pub object_id: Option<String>,
    /// One of ">=", ">", "<=", "<" for container_level.
    #[pyo3(get, set)]
    pub comparison: Option<String>,
    #[pyo3(get, set)]
    pub level: Option<f64>,
    #[pyo3(get, set)]
    pub activity_id: Option<String>,
    #[pyo3(get, set)]
    pub state: Option<String>,
    #[pyo3(get, set)]
    pub conditions: Vec<PyStartCondition>,
}

#[pymethods]
impl PyStartCondition {
    #[new]
    #[pyo3(signature = (kind, object_id=None, comparison=None, level=None, activity_id=None, state=None, conditions=Vec::new()))]
    fn new(
        kind: String,
        object_id: Option<String>,
        comparison: Option<String>,
        level: Option<f64>,
        activity_id: Option<String>,
        state: Option<String>,
        conditions: Vec<PyStartCondition>,
    ) -> Self {
        Self {
            kind,
            object_id,
            comparison,
            level,
            activity_id,
            state,
            conditions,
        }
    }
}

impl PyStartCondition {
    fn require<'a>(&self, value: &'a Option<String>, field: &str) -> PyResult<&'a String> {
        value.as_ref().ok_or_else(|| {
            PyValueError::new_err(format!("'{}' start condition needs '{}'", self.kind, field))
        })
    }

    fn to_condition(&self) -> PyResult<StartCondition> {
        Ok(match self.kind.as_str() {
            "container_level" => {
                let comparison = match self.comparison.as_deref() {
                    Some(">=") | None => LevelComparison::Ge,
                    Some(">") => LevelComparison::Gt,
                    Some("<=") => LevelComparison::Le,
                    Some("<") => LevelComparison::Lt,
                    Some(other) => {
                        return Err(PyValueError::new_err(format!(
                            "unknown level comparison '{}'",
                            other
                        )))
                    }
                };
                StartCondition::ContainerLevel {
                    object_id: self.require(&self.object_id, "object_id")?.clone(),
                    comparison,
                    level: self.level.unwrap_or(0.0),
                }
            }
            "container_full" => StartCondition::ContainerFull {
                object_id: self.require(&self.object_id, "object_id")?.clone(),
            },
            "container_empty" => StartCondition::ContainerEmpty {
                object_id: self.require(&self.object_id, "object_id")?.clone(),
            },
            "activity" => StartCondition::ActivityState {
                activity_id: self.require(&self.activity_id, "activity_id")?.clone(),
                state: self.state.clone().unwrap_or_else(|| "done".to_string()),
            },
            "and" => StartCondition::All(
                self.conditions
                    .iter()
                    .map(|c| c.to_condition())
                    .collect::<PyResult<_>>()?,
            ),
            "or" => StartCondition::Any(
                self.conditions
                    .iter()
                    .map(|c| c.to_condition())
                    .collect::<PyResult<_>>()?,
            ),
            other => StartCondition::Other(other.to_string()),
        })
    }
}

/// Activity definition tree (PyO3 wrapper).
#[pyclass(name = "ActivityDefinition")]
#[derive(Clone, Debug)]
pub struct PyActivityDefinition {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub name: String,
    /// "base", "sequential", "parallel", "while", "repeat" or any other composite.
    #[pyo3(get, set)]
    pub kind: String,
    #[pyo3(get, set)]
    pub sub_processes: Vec<PyActivityDefinition>,
    #[pyo3(get, set)]
    pub postpone_start: bool,
    #[pyo3(get, set)]
    pub repetitions: u32,
    #[pyo3(get, set)]
    pub start_condition: Option<PyStartCondition>,
}

#[pymethods]
impl PyActivityDefinition {
    #[new]
    #[pyo3(signature = (id, name, kind="base".to_string(), sub_processes=Vec::new(), postpone_start=false, repetitions=1, start_condition=None))]
    fn new(
        id: String,
        name: String,
        kind: String,
        sub_processes: Vec<PyActivityDefinition>,
        postpone_start: bool,
        repetitions: u32,
        start_condition: Option<PyStartCondition>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            sub_processes,
            postpone_start,
            repetitions,
            start_condition,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "ActivityDefinition(id={}, name={}, kind={}, sub_processes={})",
            self.id,
            self.name,
            self.kind,
            self.sub_processes.len()
        )
    }
}

impl PyActivityDefinition {
    fn single_child(&self) -> PyResult<Box<ActivityDefinition>> {
        match self.sub_processes.as_slice() {
            [child] => Ok(Box::new(child.to_definition()?)),
            _ => Err(PyValueError::new_err(format!(
                "{} activity '{}' needs exactly one sub process, got {}",
                self.kind,
                self.name,
                self.sub_processes.len()
            ))),
        }
    }

    fn to_definition(&self) -> PyResult<ActivityDefinition> {
        let children = || -> PyResult<Vec<ActivityDefinition>> {
            self.sub_processes.iter().map(|c| c.to_definition()).collect()
        };
        let kind = match self.kind.as_str() {
            "base" => ActivityKind::Base,
            "sequential" => ActivityKind::Sequential(children()?),
            "parallel" => ActivityKind::Parallel(children()?),
            "while" => ActivityKind::While(self.single_child()?),
            "repeat" => ActivityKind::Repeat {
                sub_process: self.single_child()?,
                repetitions: self.repetitions,
            },
            _ => ActivityKind::Structural(children()?),
        };
        Ok(ActivityDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            postpone_start: self.postpone_start,
            start_condition: self
                .start_condition
                .as_ref()
                .map(|c| c.to_condition())
                .transpose()?,
            kind,
        })
    }
}

/// Simulation object (PyO3 wrapper).
#[pyclass(name = "SimulationObject")]
#[derive(Clone, Debug)]
pub struct PySimulationObject {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub resource_capacity: Option<u32>,
    #[pyo3(get, set)]
    pub container_capacity: Option<f64>,
    /// (time, level) pairs of the container.
    #[pyo3(get, set)]
    pub level_history: Vec<(f64, f64)>,
}

#[pymethods]
impl PySimulationObject {
    #[new]
    #[pyo3(signature = (id, name, resource_capacity=None, container_capacity=None, level_history=Vec::new()))]
    fn new(
        id: String,
        name: String,
        resource_capacity: Option<u32>,
        container_capacity: Option<f64>,
        level_history: Vec<(f64, f64)>,
    ) -> Self {
        Self {
            id,
            name,
            resource_capacity,
            container_capacity,
            level_history,
        }
    }
}

impl From<&PySimulationObject> for SimulationObject {
    fn from(o: &PySimulationObject) -> Self {
        let mut object = SimulationObject::new(&o.id, &o.name);
        object.resource_capacity = o.resource_capacity;
        if let Some(capacity) = o.container_capacity {
            object = object.with_container(capacity, o.level_history.clone());
        }
        object
    }
}

/// Recorded activity instance (PyO3 wrapper).
#[pyclass(name = "RecordedActivity")]
#[derive(Clone, Debug)]
pub struct PyRecordedActivity {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub activity_id: String,
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub start: f64,
    #[pyo3(get)]
    pub end: f64,
    #[pyo3(get)]
    pub is_wait: bool,
    #[pyo3(get)]
    pub objects: Vec<String>,
}

impl From<&RecordedActivity> for PyRecordedActivity {
    fn from(r: &RecordedActivity) -> Self {
        Self {
            id: r.id.clone(),
            activity_id: r.activity_id.clone(),
            name: r.name.clone(),
            start: r.start,
            end: r.end,
            is_wait: r.is_wait(),
            objects: r.objects.clone(),
        }
    }
}

/// START entry excluded from the table in lenient mode (PyO3 wrapper).
#[pyclass(name = "UnmatchedStart")]
#[derive(Clone, Debug)]
pub struct PyUnmatchedStart {
    #[pyo3(get)]
    pub activity_id: String,
    #[pyo3(get)]
    pub label: Option<String>,
    #[pyo3(get)]
    pub start: f64,
    #[pyo3(get)]
    pub is_wait: bool,
}

#[pymethods]
impl PyUnmatchedStart {
    fn __repr__(&self) -> String {
        format!("UnmatchedStart({} at {})", self.activity_id, self.start)
    }
}

impl From<&UnmatchedStart> for PyUnmatchedStart {
    fn from(u: &UnmatchedStart) -> Self {
        Self {
            activity_id: u.activity_id.clone(),
            label: u.label.as_ref().map(|l| l.reference.clone()),
            start: u.start,
            is_wait: u.kind == InstanceKind::Wait,
        }
    }
}

/// Instance-level dependency (PyO3 wrapper).
#[pyclass(name = "Dependency")]
#[derive(Clone, Debug)]
pub struct PyDependency {
    #[pyo3(get)]
    pub from_id: String,
    #[pyo3(get)]
    pub to_id: String,
    #[pyo3(get)]
    pub from_activity: String,
    #[pyo3(get)]
    pub to_activity: String,
    #[pyo3(get)]
    pub sources: Vec<String>,
}

#[pymethods]
impl PyDependency {
    fn __repr__(&self) -> String {
        format!("Dependency({} -> {}, {:?})", self.from_id, self.to_id, self.sources)
    }
}

impl From<&Dependency> for PyDependency {
    fn from(d: &Dependency) -> Self {
        Self {
            from_id: d.from.clone(),
            to_id: d.to.clone(),
            from_activity: d.from_activity.clone(),
            to_activity: d.to_activity.clone(),
            sources: d.sources.iter().map(|s| format!("{:?}", s)).collect(),
        }
    }
}

/// Critical path table row (PyO3 wrapper).
#[pyclass(name = "CriticalPathRow")]
#[derive(Clone, Debug)]
pub struct PyCriticalPathRow {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub activity_id: String,
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub start: f64,
    #[pyo3(get)]
    pub end: f64,
    #[pyo3(get)]
    pub is_wait: bool,
    #[pyo3(get)]
    pub earliest_start: f64,
    #[pyo3(get)]
    pub latest_start: f64,
    #[pyo3(get)]
    pub slack: f64,
    #[pyo3(get)]
    pub is_critical: bool,
    /// Start as a UTC datetime, reading simulation time as epoch seconds.
    #[pyo3(get)]
    pub start_datetime: Option<DateTime<Utc>>,
    #[pyo3(get)]
    pub end_datetime: Option<DateTime<Utc>>,
}

#[pymethods]
impl PyCriticalPathRow {
    fn __repr__(&self) -> String {
        format!(
            "CriticalPathRow(id={}, start={}, end={}, is_critical={})",
            self.id, self.start, self.end, self.is_critical
        )
    }
}

impl From<&CriticalPathRow> for PyCriticalPathRow {
    fn from(r: &CriticalPathRow) -> Self {
        Self {
            id: r.id.clone(),
            activity_id: r.activity_id.clone(),
            name: r.name.clone(),
            start: r.start,
            end: r.end,
            is_wait: r.kind == InstanceKind::Wait,
            earliest_start: r.earliest_start,
            latest_start: r.latest_start,
            slack: r.slack,
            is_critical: r.is_critical,
            start_datetime: r.start_datetime(),
            end_datetime: r.end_datetime(),
        }
    }
}

fn build_input(
    final_time: f64,
    events: &[PyLogEvent],
    activities: &[PyActivityDefinition],
    objects: &[PySimulationObject],
) -> PyResult<AnalysisInput> {
    Ok(AnalysisInput {
        final_time,
        events: events
            .iter()
            .map(LogEvent::try_from)
            .collect::<PyResult<_>>()?,
        activities: activities
            .iter()
            .map(|a| a.to_definition())
            .collect::<PyResult<_>>()?,
        objects: objects.iter().map(SimulationObject::from).collect(),
    })
}

/// Analysis context with cached stages (PyO3 wrapper).
#[pyclass(name = "CriticalPathAnalysis")]
pub struct PyCriticalPathAnalysis {
    inner: CriticalPathAnalysis,
}

#[pymethods]
impl PyCriticalPathAnalysis {
    #[new]
    #[pyo3(signature = (final_time, events, activities, objects=Vec::new(), config=None))]
    fn new(
        final_time: f64,
        events: Vec<PyLogEvent>,
        activities: Vec<PyActivityDefinition>,
        objects: Vec<PySimulationObject>,
        config: Option<PyAnalysisConfig>,
    ) -> PyResult<Self> {
        let input = build_input(final_time, &events, &activities, &objects)?;
        let config = config.as_ref().map(AnalysisConfig::from).unwrap_or_default();
        Ok(Self {
            inner: CriticalPathAnalysis::new(input, config),
        })
    }

    fn get_recorded_activity_table(&mut self) -> PyResult<Vec<PyRecordedActivity>> {
        let table = self.inner.get_recorded_activity_table().map_err(to_py_err)?;
        Ok(table.rows().iter().map(PyRecordedActivity::from).collect())
    }

    /// Starts left out of the recorded table when `strict_trace` is off.
    fn unmatched_starts(&mut self) -> PyResult<Vec<PyUnmatchedStart>> {
        let unmatched = self.inner.unmatched_starts().map_err(to_py_err)?;
        Ok(unmatched.iter().map(PyUnmatchedStart::from).collect())
    }

    /// Model-level (from, to) activity id pairs.
    fn model_dependency_list(&mut self) -> PyResult<Vec<(String, String)>> {
        let graph = self.inner.model_dependency_graph().map_err(to_py_err)?;
        Ok(graph.dependency_list())
    }

    fn get_dependency_list(&mut self) -> PyResult<Vec<PyDependency>> {
        let deps = self.inner.get_dependency_list().map_err(to_py_err)?;
        Ok(deps.iter().map(PyDependency::from).collect())
    }

    fn get_critical_path_table(&mut self) -> PyResult<Vec<PyCriticalPathRow>> {
        let rows = self.inner.get_critical_path_table().map_err(to_py_err)?;
        Ok(rows.iter().map(PyCriticalPathRow::from).collect())
    }

    fn makespan(&mut self) -> PyResult<f64> {
        self.inner.makespan().map_err(to_py_err)
    }
}

/// Run the full critical path analysis on a finished simulation.
///
/// # Raises
/// * ValueError on invalid activity configuration or an inconsistent trace
#[pyfunction]
#[pyo3(signature = (final_time, events, activities, objects=Vec::new(), config=None))]
fn analyze_critical_path(
    final_time: f64,
    events: Vec<PyLogEvent>,
    activities: Vec<PyActivityDefinition>,
    objects: Vec<PySimulationObject>,
    config: Option<PyAnalysisConfig>,
) -> PyResult<Vec<PyCriticalPathRow>> {
    let mut analysis =
        PyCriticalPathAnalysis::new(final_time, events, activities, objects, config)?;
    analysis.get_critical_path_table()
}

/// The simcrit.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Inputs
    m.add_class::<PyLogEvent>()?;
    m.add_class::<PyActivityDefinition>()?;
    m.add_class::<PyStartCondition>()?;
    m.add_class::<PySimulationObject>()?;
    m.add_class::<PyAnalysisConfig>()?;

    // Outputs
    m.add_class::<PyRecordedActivity>()?;
    m.add_class::<PyUnmatchedStart>()?;
    m.add_class::<PyDependency>()?;
    m.add_class::<PyCriticalPathRow>()?;

    // Analysis
    m.add_class::<PyCriticalPathAnalysis>()?;
    m.add_function(wrap_pyfunction!(analyze_critical_path, m)?)?;

    Ok(())
}
