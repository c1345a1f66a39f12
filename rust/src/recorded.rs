//! Flattening of the raw event log into recorded activity instances.
//!
//! Log entries are grouped by (activity, label, log owner) and consecutive
//! START/STOP (or WAIT_START/WAIT_STOP) entries are paired into intervals.
//! Intervals found in simulation object logs are folded into the activity's
//! own interval that contains them, which records the object as involved in
//! that instance.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::log_stage;
use crate::log_warning;
use crate::models::{
    ActivityDefinition, ActivityLabel, InstanceKind, LogEvent, LogSource, LogState,
    RecordedActivity, SimTime,
};

/// Inconsistencies in the trace that make the table unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error(
        "activity '{activity_id}'{} started at t={start} has no matching STOP before the end of the simulation (t={final_time}); {total} unmatched START entries in total",
        .label.as_ref().map(|l| format!(" [{}]", l)).unwrap_or_default()
    )]
    UnmatchedStart {
        activity_id: String,
        label: Option<String>,
        start: SimTime,
        final_time: SimTime,
        total: usize,
    },
}

/// A START (or WAIT_START) that never got its closing entry.
#[derive(Clone, Debug, PartialEq)]
pub struct UnmatchedStart {
    pub activity_id: String,
    pub label: Option<ActivityLabel>,
    pub start: SimTime,
    pub kind: InstanceKind,
}

/// Ordered table of recorded activity instances.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordedActivityTable {
    rows: Vec<RecordedActivity>,
    index: FxHashMap<String, usize>,
}

impl RecordedActivityTable {
    /// Build a table from rows, sorting them by (start, end, log position, id).
    pub fn from_rows(mut rows: Vec<RecordedActivity>) -> Self {
        rows.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then(a.end.total_cmp(&b.end))
                .then(a.start_seq.cmp(&b.start_seq))
                .then_with(|| a.id.cmp(&b.id))
        });
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self { rows, index }
    }

    pub fn rows(&self) -> &[RecordedActivity] {
        &self.rows
    }

    pub fn get(&self, id: &str) -> Option<&RecordedActivity> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Normal instances of one activity in start order.
    pub fn instances_of<'a>(
        &'a self,
        activity_id: &'a str,
    ) -> impl Iterator<Item = &'a RecordedActivity> + 'a {
        self.rows
            .iter()
            .filter(move |r| r.activity_id == activity_id && r.kind == InstanceKind::Normal)
    }

    /// Normal instances grouped by activity id, each group in start order.
    pub fn normal_by_activity(&self) -> FxHashMap<&str, Vec<&RecordedActivity>> {
        let mut grouped: FxHashMap<&str, Vec<&RecordedActivity>> = FxHashMap::default();
        for row in self.rows.iter().filter(|r| r.kind == InstanceKind::Normal) {
            grouped.entry(row.activity_id.as_str()).or_default().push(row);
        }
        grouped
    }
}

/// Result of flattening a log before strictness is applied.
#[derive(Clone, Debug)]
pub struct RecordedBuild {
    pub table: RecordedActivityTable,
    pub unmatched: Vec<UnmatchedStart>,
    /// STOP entries that had no open START.
    pub orphan_stops: usize,
}

type GroupKey = (String, Option<ActivityLabel>, Option<String>);

/// A log entry identified by its time and its position in the ordered log.
type Mark = (SimTime, usize);

#[derive(Default)]
struct GroupState {
    open_start: Option<Mark>,
    open_wait: Option<Mark>,
    intervals: Vec<(Mark, Mark, InstanceKind)>,
}

/// Partially built instance before ids are assigned.
struct Draft {
    activity_id: String,
    label: Option<ActivityLabel>,
    start: Mark,
    end: Mark,
    kind: InstanceKind,
    objects: Vec<String>,
}

/// Builds the recorded activity table from a completed simulation log.
pub struct RecordedActivityBuilder<'a> {
    config: &'a AnalysisConfig,
    names: FxHashMap<&'a str, &'a str>,
    composites: FxHashSet<&'a str>,
}

impl<'a> RecordedActivityBuilder<'a> {
    pub fn new(activities: &'a [ActivityDefinition], config: &'a AnalysisConfig) -> Self {
        let mut names = FxHashMap::default();
        let mut composites = FxHashSet::default();
        for activity in activities {
            activity.walk(&mut |def| {
                names.insert(def.id.as_str(), def.name.as_str());
                if !def.is_base() {
                    composites.insert(def.id.as_str());
                }
            });
        }
        Self {
            config,
            names,
            composites,
        }
    }

    /// Flatten the log, reporting unmatched entries instead of failing.
    pub fn build(&self, events: &[LogEvent]) -> RecordedBuild {
        let verbosity = self.config.verbosity;

        // Stable sort keeps engine order for entries at the same instant
        let mut ordered: Vec<&LogEvent> = events
            .iter()
            .filter(|e| !self.composites.contains(e.activity_id.as_str()))
            .collect();
        ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut groups: FxHashMap<GroupKey, GroupState> = FxHashMap::default();
        let mut group_order: Vec<GroupKey> = Vec::new();
        let mut unmatched = Vec::new();
        let mut orphan_stops = 0;

        for (seq, event) in ordered.into_iter().enumerate() {
            let owner = match &event.source {
                LogSource::Activity => None,
                LogSource::Object(id) => Some(id.clone()),
            };
            let key = (event.activity_id.clone(), event.label.clone(), owner);
            if !groups.contains_key(&key) {
                group_order.push(key.clone());
            }
            let state = groups.entry(key).or_default();

            let t = event.timestamp;
            match event.state {
                LogState::Start | LogState::WaitStart => {
                    let (slot, kind) = if event.state == LogState::Start {
                        (&mut state.open_start, InstanceKind::Normal)
                    } else {
                        (&mut state.open_wait, InstanceKind::Wait)
                    };
                    if let Some((previous, _)) = slot.replace((t, seq)) {
                        // A new execution cannot begin before the previous one ends
                        unmatched.push(UnmatchedStart {
                            activity_id: event.activity_id.clone(),
                            label: event.label.clone(),
                            start: previous,
                            kind,
                        });
                    }
                }
                LogState::Stop | LogState::WaitStop => {
                    let (slot, kind) = if event.state == LogState::Stop {
                        (&mut state.open_start, InstanceKind::Normal)
                    } else {
                        (&mut state.open_wait, InstanceKind::Wait)
                    };
                    match slot.take() {
                        Some((start, start_seq)) => state.intervals.push((
                            (start, start_seq),
                            (t.max(start), seq),
                            kind,
                        )),
                        None => {
                            orphan_stops += 1;
                            log_warning!(
                                verbosity,
                                "ignoring {:?} of '{}' at t={} without an open start",
                                event.state,
                                event.activity_id,
                                t
                            );
                        }
                    }
                }
            }
        }

        let mut drafts: Vec<Draft> = Vec::new();
        let mut by_context: FxHashMap<(String, Option<ActivityLabel>, InstanceKind), Vec<usize>> =
            FxHashMap::default();

        // Activity-owned intervals first so object intervals can fold into them
        let (own, foreign): (Vec<&GroupKey>, Vec<&GroupKey>) =
            group_order.iter().partition(|key| key.2.is_none());

        for key in own.into_iter().chain(foreign) {
            let Some(state) = groups.get(key) else {
                continue;
            };
            for (kind, open) in [
                (InstanceKind::Normal, state.open_start),
                (InstanceKind::Wait, state.open_wait),
            ] {
                if let Some((start, _)) = open {
                    unmatched.push(UnmatchedStart {
                        activity_id: key.0.clone(),
                        label: key.1.clone(),
                        start,
                        kind,
                    });
                }
            }

            for &(start, end, kind) in &state.intervals {
                let context = (key.0.clone(), key.1.clone(), kind);
                let slots = by_context.entry(context).or_default();
                match &key.2 {
                    None => {
                        slots.push(drafts.len());
                        drafts.push(Draft {
                            activity_id: key.0.clone(),
                            label: key.1.clone(),
                            start,
                            end,
                            kind,
                            objects: Vec::new(),
                        });
                    }
                    Some(object_id) => {
                        let host = slots.iter().copied().find(|&i| {
                            self.config.not_after(drafts[i].start.0, start.0)
                                && self.config.not_after(end.0, drafts[i].end.0)
                        });
                        match host {
                            Some(i) => {
                                if !drafts[i].objects.contains(object_id) {
                                    drafts[i].objects.push(object_id.clone());
                                }
                            }
                            None => {
                                slots.push(drafts.len());
                                drafts.push(Draft {
                                    activity_id: key.0.clone(),
                                    label: key.1.clone(),
                                    start,
                                    end,
                                    kind,
                                    objects: vec![object_id.clone()],
                                });
                            }
                        }
                    }
                }
            }
        }

        let rows = self.assign_ids(drafts);
        let table = RecordedActivityTable::from_rows(rows);
        log_stage!(
            verbosity,
            "recorded {} activity instances ({} unmatched, {} orphan stops)",
            table.len(),
            unmatched.len(),
            orphan_stops
        );

        RecordedBuild {
            table,
            unmatched,
            orphan_stops,
        }
    }

    /// Flatten the log and apply the configured strictness.
    ///
    /// In lenient mode the excluded starts stay in `RecordedBuild::unmatched`.
    pub fn finish(
        &self,
        events: &[LogEvent],
        final_time: SimTime,
    ) -> Result<RecordedBuild, TraceError> {
        let build = self.build(events);
        if let Some(first) = build.unmatched.first() {
            if self.config.strict_trace {
                return Err(TraceError::UnmatchedStart {
                    activity_id: first.activity_id.clone(),
                    label: first.label.as_ref().map(|l| l.reference.clone()),
                    start: first.start,
                    final_time,
                    total: build.unmatched.len(),
                });
            }
            for entry in &build.unmatched {
                log_warning!(
                    self.config.verbosity,
                    "excluding {:?} instance of '{}' started at t={} (still running at t={})",
                    entry.kind,
                    entry.activity_id,
                    entry.start,
                    final_time
                );
            }
        }
        Ok(build)
    }

    /// Number instances per (activity, label, kind) in start order and derive ids.
    fn assign_ids(&self, mut drafts: Vec<Draft>) -> Vec<RecordedActivity> {
        drafts.sort_by(|a, b| {
            a.start
                .0
                .total_cmp(&b.start.0)
                .then(a.end.0.total_cmp(&b.end.0))
                .then(a.start.1.cmp(&b.start.1))
        });

        let mut counters: FxHashMap<(String, Option<ActivityLabel>, InstanceKind), usize> =
            FxHashMap::default();
        let mut previous_end: FxHashMap<String, SimTime> = FxHashMap::default();

        drafts
            .into_iter()
            .map(|mut draft| {
                let counter = counters
                    .entry((draft.activity_id.clone(), draft.label.clone(), draft.kind))
                    .or_default();
                let ordinal = *counter;
                *counter += 1;

                let ((start, start_seq), (end, end_seq)) = (draft.start, draft.end);
                if draft.kind == InstanceKind::Normal && draft.label.is_none() {
                    if let Some(&previous) = previous_end.get(&draft.activity_id) {
                        if !self.config.not_after(previous, start) {
                            log_warning!(
                                self.config.verbosity,
                                "instances of '{}' overlap: t={} starts before t={}",
                                draft.activity_id,
                                start,
                                previous
                            );
                        }
                    }
                    previous_end.insert(draft.activity_id.clone(), end);
                }

                let id = instance_id(
                    &draft.activity_id,
                    draft.label.as_ref(),
                    draft.kind,
                    ordinal,
                );

                draft.objects.sort();
                let name = self
                    .names
                    .get(draft.activity_id.as_str())
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| draft.activity_id.clone());

                RecordedActivity {
                    id,
                    activity_id: draft.activity_id,
                    name,
                    label: draft.label,
                    ordinal,
                    start,
                    end,
                    kind: draft.kind,
                    objects: draft.objects,
                    start_seq,
                    end_seq,
                }
            })
            .collect()
    }
}

/// `{activity}[{label}]~wait#{ordinal}`, with the separator characters
/// escaped inside activity ids and label references.
fn instance_id(
    activity_id: &str,
    label: Option<&ActivityLabel>,
    kind: InstanceKind,
    ordinal: usize,
) -> String {
    let mut id = String::with_capacity(activity_id.len() + 8);
    push_escaped(&mut id, activity_id);
    if let Some(label) = label {
        id.push('[');
        push_escaped(&mut id, &label.reference);
        id.push(']');
    }
    if kind == InstanceKind::Wait {
        id.push_str("~wait");
    }
    id.push('#');
    id.push_str(&ordinal.to_string());
    id
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, '[' | ']' | '~' | '#' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityLabel;

    fn ev(t: f64, activity: &str, state: LogState) -> LogEvent {
        LogEvent::new(t, activity, state)
    }

    fn build(events: &[LogEvent], activities: &[ActivityDefinition]) -> RecordedBuild {
        let config = AnalysisConfig::default();
        RecordedActivityBuilder::new(activities, &config).build(events)
    }

    #[test]
    fn test_pairs_start_and_stop() {
        let events = vec![
            ev(0.0, "a", LogState::Start),
            ev(5.0, "a", LogState::Stop),
            ev(5.0, "b", LogState::Start),
            ev(8.0, "b", LogState::Stop),
        ];
        let result = build(&events, &[ActivityDefinition::base("a", "Load")]);

        assert!(result.unmatched.is_empty());
        let rows = result.table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "a#0");
        assert_eq!(rows[0].name, "Load");
        assert_eq!((rows[0].start, rows[0].end), (0.0, 5.0));
        // Unknown activity ids fall back to their id as name
        assert_eq!(rows[1].name, "b");
        assert_eq!(rows[1].duration(), 3.0);
    }

    #[test]
    fn test_loop_yields_ordered_instances() {
        let mut events = Vec::new();
        for i in 0..3 {
            let t = i as f64 * 4.0;
            events.push(ev(t, "a", LogState::Start));
            events.push(ev(t + 2.0, "a", LogState::Stop));
        }
        let result = build(&events, &[]);
        let rows = result.table.rows();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.activity_id == "a"));
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a#0", "a#1", "a#2"]);
        assert!(rows.windows(2).all(|w| w[0].start < w[1].start));
        assert_eq!(result.table.instances_of("a").count(), 3);
    }

    #[test]
    fn test_trailing_start_is_reported() {
        let events = vec![
            ev(0.0, "a", LogState::Start),
            ev(2.0, "a", LogState::Stop),
            ev(3.0, "a", LogState::Start),
        ];
        let result = build(&events, &[]);
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.unmatched.len(), 1);
        assert_eq!(result.unmatched[0].start, 3.0);
    }

    #[test]
    fn test_finish_strict_fails_on_unmatched_start() {
        let events = vec![ev(3.0, "a", LogState::Start)];
        let config = AnalysisConfig::default();
        let err = RecordedActivityBuilder::new(&[], &config)
            .finish(&events, 10.0)
            .unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnmatchedStart { ref activity_id, total: 1, .. } if activity_id == "a"
        ));
    }

    #[test]
    fn test_finish_lenient_excludes_unmatched_start() {
        let events = vec![
            ev(0.0, "a", LogState::Start),
            ev(1.0, "a", LogState::Stop),
            ev(3.0, "b", LogState::Start),
        ];
        let config = AnalysisConfig {
            strict_trace: false,
            ..Default::default()
        };
        let build = RecordedActivityBuilder::new(&[], &config)
            .finish(&events, 10.0)
            .unwrap();
        assert_eq!(build.table.len(), 1);
        assert!(build.table.get("b#0").is_none());
        assert_eq!(build.unmatched.len(), 1);
        assert_eq!(build.unmatched[0].activity_id, "b");
        assert_eq!(build.unmatched[0].start, 3.0);
    }

    #[test]
    fn test_orphan_stop_is_ignored() {
        let events = vec![ev(1.0, "a", LogState::Stop)];
        let result = build(&events, &[]);
        assert!(result.table.is_empty());
        assert_eq!(result.orphan_stops, 1);
    }

    #[test]
    fn test_wait_markers_form_wait_instances() {
        let events = vec![
            ev(0.0, "a", LogState::WaitStart),
            ev(4.0, "a", LogState::WaitStop),
            ev(4.0, "a", LogState::Start),
            ev(6.0, "a", LogState::Stop),
        ];
        let result = build(&events, &[]);
        let wait = result.table.get("a~wait#0").unwrap();
        assert_eq!(wait.kind, InstanceKind::Wait);
        assert_eq!((wait.start, wait.end), (0.0, 4.0));
        assert_eq!(result.table.get("a#0").unwrap().start, 4.0);
        // Only normal instances are listed per activity
        assert_eq!(result.table.instances_of("a").count(), 1);
    }

    #[test]
    fn test_object_log_folds_into_activity_instance() {
        let events = vec![
            ev(0.0, "a", LogState::Start),
            ev(1.0, "a", LogState::Start).in_object_log("vessel"),
            ev(4.0, "a", LogState::Stop).in_object_log("vessel"),
            ev(1.0, "a", LogState::Start).in_object_log("site"),
            ev(4.0, "a", LogState::Stop).in_object_log("site"),
            ev(5.0, "a", LogState::Stop),
        ];
        let result = build(&events, &[]);
        assert_eq!(result.table.len(), 1);
        let row = &result.table.rows()[0];
        assert_eq!(row.objects, vec!["site", "vessel"]);
        assert!(row.involves("vessel"));
    }

    #[test]
    fn test_object_only_interval_becomes_instance() {
        let events = vec![
            ev(2.0, "x", LogState::Start).in_object_log("crane"),
            ev(3.0, "x", LogState::Stop).in_object_log("crane"),
        ];
        let result = build(&events, &[]);
        let row = result.table.get("x#0").unwrap();
        assert_eq!(row.objects, vec!["crane"]);
    }

    #[test]
    fn test_composite_activities_are_not_recorded() {
        let seq = ActivityDefinition::sequential(
            "s",
            "Seq",
            vec![ActivityDefinition::base("a", "A").postponed()],
        );
        let events = vec![
            ev(0.0, "s", LogState::Start),
            ev(0.0, "s", LogState::Start).with_label(ActivityLabel::sub_process("a")),
            ev(0.0, "a", LogState::Start),
            ev(2.0, "a", LogState::Stop),
            ev(2.0, "s", LogState::Stop).with_label(ActivityLabel::sub_process("a")),
            ev(2.0, "s", LogState::Stop),
        ];
        let result = build(&events, &[seq]);
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.table.rows()[0].id, "a#0");
    }

    #[test]
    fn test_labels_form_separate_contexts() {
        let events = vec![
            ev(0.0, "a", LogState::Start),
            ev(1.0, "a", LogState::Start).with_label(ActivityLabel::resource("crane")),
            ev(2.0, "a", LogState::Stop).with_label(ActivityLabel::resource("crane")),
            ev(3.0, "a", LogState::Stop),
        ];
        let result = build(&events, &[]);
        assert!(result.unmatched.is_empty());
        assert!(result.table.get("a#0").is_some());
        assert!(result.table.get("a[crane]#0").is_some());
    }

    #[test]
    fn test_zero_duration_instances_keep_log_order() {
        let mut events = Vec::new();
        for activity in ["b", "a", "b"] {
            events.push(ev(2.0, activity, LogState::Start));
            events.push(ev(2.0, activity, LogState::Stop));
        }
        let result = build(&events, &[]);
        let ids: Vec<&str> = result.table.rows().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b#0", "a#0", "b#1"]);

        let a = result.table.get("a#0").unwrap();
        assert_eq!((a.start_seq, a.end_seq), (2, 3));
        assert!(result.table.get("b#1").unwrap().start_seq > a.end_seq);
    }

    #[test]
    fn test_separator_characters_do_not_collide() {
        let events = vec![
            ev(0.0, "a", LogState::Start).with_label(ActivityLabel::resource("x")),
            ev(4.0, "a", LogState::Stop).with_label(ActivityLabel::resource("x")),
            ev(0.0, "a[x]", LogState::Start),
            ev(4.0, "a[x]", LogState::Stop),
            ev(5.0, "b#0", LogState::WaitStart),
            ev(6.0, "b#0", LogState::WaitStop),
        ];
        let result = build(&events, &[]);
        assert_eq!(result.table.len(), 3);
        assert_eq!(result.table.get("a[x]#0").unwrap().activity_id, "a");
        assert_eq!(result.table.get("a\\[x\\]#0").unwrap().activity_id, "a[x]");
        assert!(result.table.get("b\\#0~wait#0").unwrap().is_wait());
    }

    #[test]
    fn test_idempotent_ids() {
        let events = vec![
            ev(0.0, "a", LogState::Start),
            ev(1.0, "a", LogState::Stop),
            ev(1.0, "a", LogState::Start),
            ev(1.0, "a", LogState::Stop),
        ];
        let first = build(&events, &[]).table;
        let second = build(&events, &[]).table;
        assert_eq!(first, second);
        // Zero-duration instance is kept
        assert_eq!(first.get("a#1").unwrap().duration(), 0.0);
    }
}
