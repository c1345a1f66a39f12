//! Dependencies from container-level start conditions.
//!
//! An activity gated on a container level of object O starts once O's level
//! crosses the threshold. The instance that caused the last crossing before
//! the gated start is the one that ended at the crossing time while
//! involving O. Only container conditions are understood; anything else is
//! skipped with a warning.

use rustc_hash::FxHashMap;

use crate::config::AnalysisConfig;
use crate::models::{
    ActivityDefinition, ContainerState, LevelComparison, RecordedActivity, SimTime,
    SimulationObject, StartCondition,
};
use crate::recorded::RecordedActivityTable;
use crate::{log_debug, log_warning};

use super::InstancePair;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Threshold {
    Compare(LevelComparison, f64),
    Full,
    Empty,
}

/// A single container predicate extracted from a start condition.
#[derive(Clone, Debug, PartialEq)]
struct ContainerCondition<'a> {
    object_id: &'a str,
    threshold: Threshold,
}

impl ContainerCondition<'_> {
    fn holds(&self, level: f64, container: &ContainerState, tolerance: f64) -> bool {
        match self.threshold {
            Threshold::Compare(cmp, value) => cmp.holds(level, value),
            Threshold::Full => level >= container.capacity - tolerance,
            Threshold::Empty => level <= tolerance,
        }
    }
}

/// Collect the container predicates of `condition`; the rest is reported and dropped.
fn container_conditions<'a>(
    activity_id: &str,
    condition: &'a StartCondition,
    config: &AnalysisConfig,
    out: &mut Vec<ContainerCondition<'a>>,
) {
    match condition {
        StartCondition::ContainerLevel {
            object_id,
            comparison,
            level,
        } => out.push(ContainerCondition {
            object_id,
            threshold: Threshold::Compare(*comparison, *level),
        }),
        StartCondition::ContainerFull { object_id } => out.push(ContainerCondition {
            object_id,
            threshold: Threshold::Full,
        }),
        StartCondition::ContainerEmpty { object_id } => out.push(ContainerCondition {
            object_id,
            threshold: Threshold::Empty,
        }),
        // Every conjunct had to hold, so each container conjunct gates the start
        StartCondition::All(children) => {
            for child in children {
                container_conditions(activity_id, child, config, out);
            }
        }
        other => log_warning!(
            config.verbosity,
            "start condition '{}' of activity '{}' is not supported, skipping",
            other.type_name(),
            activity_id
        ),
    }
}

/// Level history sorted by time.
fn sorted_history(container: &ContainerState) -> Vec<(SimTime, f64)> {
    let mut history = container.level_history.clone();
    history.sort_by(|a, b| a.0.total_cmp(&b.0));
    history
}

/// Last time at or before `at` where the condition switched from false to true.
///
/// Returns `None` when the condition does not hold at `at`.
fn last_crossing(
    condition: &ContainerCondition<'_>,
    container: &ContainerState,
    history: &[(SimTime, f64)],
    at: SimTime,
    config: &AnalysisConfig,
) -> Option<SimTime> {
    let upto = history.partition_point(|&(t, _)| config.not_after(t, at));
    let (_, level_now) = *history[..upto].last()?;
    if !condition.holds(level_now, container, config.tolerance) {
        return None;
    }
    (1..upto).rev().find_map(|i| {
        let before = condition.holds(history[i - 1].1, container, config.tolerance);
        let after = condition.holds(history[i].1, container, config.tolerance);
        (!before && after).then_some(history[i].0)
    })
}

pub fn start_event_dependencies(
    table: &RecordedActivityTable,
    activities: &[ActivityDefinition],
    objects: &[SimulationObject],
    config: &AnalysisConfig,
) -> Vec<InstancePair> {
    let objects_by_id: FxHashMap<&str, &SimulationObject> =
        objects.iter().map(|o| (o.id.as_str(), o)).collect();

    let mut gated: Vec<&ActivityDefinition> = Vec::new();
    for activity in activities {
        activity.walk(&mut |def| {
            if def.start_condition.is_some() {
                gated.push(def);
            }
        });
    }

    let mut pairs = Vec::new();
    for def in gated {
        let Some(condition) = &def.start_condition else {
            continue;
        };
        let mut conditions = Vec::new();
        container_conditions(&def.id, condition, config, &mut conditions);

        let instances: Vec<&RecordedActivity> = table.instances_of(&def.id).collect();
        for cond in &conditions {
            let Some(container) = objects_by_id
                .get(cond.object_id)
                .and_then(|o| o.container.as_ref())
            else {
                log_warning!(
                    config.verbosity,
                    "start condition of '{}' refers to '{}' which has no container, skipping",
                    def.id,
                    cond.object_id
                );
                continue;
            };
            let history = sorted_history(container);

            let mut previous_start: Option<SimTime> = None;
            for instance in &instances {
                let crossing =
                    last_crossing(cond, container, &history, instance.start, config);
                let earlier = previous_start.replace(instance.start);
                let Some(t_star) = crossing else {
                    continue;
                };
                // A crossing already consumed by the previous start gates nothing new
                if earlier.is_some_and(|prev| config.not_after(t_star, prev)) {
                    continue;
                }
                if let Some(gater) = unique_gater(table, instance, cond.object_id, t_star, config)
                {
                    log_debug!(
                        config.verbosity,
                        "start event: {} -> {} via '{}' at t={}",
                        gater.id,
                        instance.id,
                        cond.object_id,
                        t_star
                    );
                    pairs.push((gater.id.clone(), instance.id.clone()));
                }
            }
        }
    }

    pairs
}

/// The only other normal instance involving `object_id` that ended at `t_star`.
fn unique_gater<'t>(
    table: &'t RecordedActivityTable,
    gated: &RecordedActivity,
    object_id: &str,
    t_star: SimTime,
    config: &AnalysisConfig,
) -> Option<&'t RecordedActivity> {
    let mut candidates = table.rows().iter().filter(|r| {
        !r.is_wait()
            && r.id != gated.id
            && r.involves(object_id)
            && config.same_time(r.end, t_star)
    });
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::tests::make_instance;

    fn involving(id: &str, activity: &str, start: f64, end: f64, object: &str) -> RecordedActivity {
        let mut row = make_instance(id, activity, start, end);
        row.objects.push(object.to_string());
        row
    }

    fn run(
        rows: Vec<RecordedActivity>,
        activities: &[ActivityDefinition],
        objects: &[SimulationObject],
    ) -> Vec<InstancePair> {
        let table = RecordedActivityTable::from_rows(rows);
        start_event_dependencies(&table, activities, objects, &AnalysisConfig::default())
    }

    fn site(history: Vec<(f64, f64)>) -> SimulationObject {
        SimulationObject::new("site", "Site").with_container(10.0, history)
    }

    fn gated_on_full() -> ActivityDefinition {
        ActivityDefinition::base("ship", "Ship").with_start_condition(
            StartCondition::ContainerFull {
                object_id: "site".to_string(),
            },
        )
    }

    #[test]
    fn test_filling_instance_gates_start() {
        let rows = vec![
            involving("load#0", "load", 0.0, 4.0, "site"),
            make_instance("ship#0", "ship", 4.0, 6.0),
        ];
        let objects = [site(vec![(0.0, 0.0), (4.0, 10.0)])];
        assert_eq!(
            run(rows, &[gated_on_full()], &objects),
            vec![("load#0".to_string(), "ship#0".to_string())]
        );
    }

    #[test]
    fn test_condition_true_from_the_start_has_no_gater() {
        let rows = vec![make_instance("ship#0", "ship", 0.0, 2.0)];
        let objects = [site(vec![(0.0, 10.0)])];
        assert!(run(rows, &[gated_on_full()], &objects).is_empty());
    }

    #[test]
    fn test_ambiguous_gater_yields_nothing() {
        let rows = vec![
            involving("load#0", "load", 0.0, 4.0, "site"),
            involving("fill#0", "fill", 1.0, 4.0, "site"),
            make_instance("ship#0", "ship", 4.0, 6.0),
        ];
        let objects = [site(vec![(0.0, 0.0), (4.0, 10.0)])];
        assert!(run(rows, &[gated_on_full()], &objects).is_empty());
    }

    #[test]
    fn test_level_comparison_with_repeated_gating() {
        let gated = ActivityDefinition::base("ship", "Ship").with_start_condition(
            StartCondition::ContainerLevel {
                object_id: "site".to_string(),
                comparison: LevelComparison::Ge,
                level: 5.0,
            },
        );
        let rows = vec![
            involving("load#0", "load", 0.0, 2.0, "site"),
            make_instance("ship#0", "ship", 2.0, 3.0),
            involving("load#1", "load", 3.0, 6.0, "site"),
            make_instance("ship#1", "ship", 6.0, 7.0),
        ];
        let objects = [site(vec![(0.0, 0.0), (2.0, 5.0), (3.0, 0.0), (6.0, 5.0)])];
        assert_eq!(
            run(rows, &[gated], &objects),
            vec![
                ("load#0".to_string(), "ship#0".to_string()),
                ("load#1".to_string(), "ship#1".to_string()),
            ]
        );
    }

    #[test]
    fn test_crossing_is_not_reused_by_later_instance() {
        let rows = vec![
            involving("load#0", "load", 0.0, 2.0, "site"),
            make_instance("ship#0", "ship", 2.0, 3.0),
            make_instance("ship#1", "ship", 5.0, 6.0),
        ];
        let objects = [site(vec![(0.0, 0.0), (2.0, 10.0)])];
        assert_eq!(run(rows, &[gated_on_full()], &objects).len(), 1);
    }

    #[test]
    fn test_empty_condition_inside_all() {
        let gated = ActivityDefinition::base("ship", "Ship").with_start_condition(
            StartCondition::All(vec![
                StartCondition::ContainerEmpty {
                    object_id: "site".to_string(),
                },
                StartCondition::ActivityState {
                    activity_id: "x".to_string(),
                    state: "done".to_string(),
                },
            ]),
        );
        let rows = vec![
            involving("unload#0", "unload", 0.0, 3.0, "site"),
            make_instance("ship#0", "ship", 3.0, 4.0),
        ];
        let objects = [site(vec![(0.0, 10.0), (3.0, 0.0)])];
        assert_eq!(run(rows, &[gated], &objects).len(), 1);
    }

    #[test]
    fn test_unsupported_and_missing_are_skipped() {
        let rows = vec![
            involving("load#0", "load", 0.0, 4.0, "site"),
            make_instance("ship#0", "ship", 4.0, 6.0),
        ];
        let by_state = ActivityDefinition::base("ship", "Ship").with_start_condition(
            StartCondition::ActivityState {
                activity_id: "load".to_string(),
                state: "done".to_string(),
            },
        );
        let objects = [site(vec![(0.0, 0.0), (4.0, 10.0)])];
        assert!(run(rows.clone(), &[by_state], &objects).is_empty());
        // Object without a container
        let bare = [SimulationObject::new("site", "Site")];
        assert!(run(rows, &[gated_on_full()], &bare).is_empty());
    }
}
