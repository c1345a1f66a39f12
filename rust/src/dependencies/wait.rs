//! Dependencies around explicit wait markers.
//!
//! A wait instance W of activity X covers the time X spent blocked. When
//! exactly one instance of another activity ends at the moment W ends, that
//! instance is taken to have released the wait. The normal instance of X
//! starting when W ends continues after the wait. Waits with no plausible
//! releaser only keep their link to X.

use crate::config::AnalysisConfig;
use crate::log_debug;
use crate::models::RecordedActivity;
use crate::recorded::RecordedActivityTable;

use super::InstancePair;

pub fn wait_dependencies(
    table: &RecordedActivityTable,
    config: &AnalysisConfig,
) -> Vec<InstancePair> {
    let mut pairs = Vec::new();

    for wait in table.rows().iter().filter(|r| r.is_wait()) {
        if let Some(releaser) = unique_releaser(table, wait, config) {
            log_debug!(
                config.verbosity,
                "wait: {} released by {}",
                wait.id,
                releaser.id
            );
            pairs.push((releaser.id.clone(), wait.id.clone()));
        }
        if let Some(resumed) = table
            .instances_of(&wait.activity_id)
            .find(|r| config.same_time(r.start, wait.end))
        {
            pairs.push((wait.id.clone(), resumed.id.clone()));
        }
    }

    pairs
}

fn unique_releaser<'t>(
    table: &'t RecordedActivityTable,
    wait: &RecordedActivity,
    config: &AnalysisConfig,
) -> Option<&'t RecordedActivity> {
    let mut candidates = table.rows().iter().filter(|r| {
        !r.is_wait()
            && r.activity_id != wait.activity_id
            && config.same_time(r.end, wait.end)
            && config.not_after(r.start, wait.end)
    });
    let first = candidates.next()?;
    candidates.next().is_none().then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::tests::make_instance;
    use crate::models::InstanceKind;

    fn make_wait(id: &str, activity: &str, start: f64, end: f64) -> RecordedActivity {
        RecordedActivity {
            kind: InstanceKind::Wait,
            ..make_instance(id, activity, start, end)
        }
    }

    fn run(rows: Vec<RecordedActivity>) -> Vec<InstancePair> {
        let table = RecordedActivityTable::from_rows(rows);
        wait_dependencies(&table, &AnalysisConfig::default())
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<InstancePair> {
        expected
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_wait_released_by_other_activity() {
        let rows = vec![
            make_instance("load#0", "load", 0.0, 4.0),
            make_wait("ship~wait#0", "ship", 0.0, 4.0),
            make_instance("ship#0", "ship", 4.0, 6.0),
        ];
        assert_eq!(
            run(rows),
            pairs(&[("load#0", "ship~wait#0"), ("ship~wait#0", "ship#0")])
        );
    }

    #[test]
    fn test_ambiguous_releaser_keeps_only_resume_link() {
        let rows = vec![
            make_instance("load#0", "load", 0.0, 4.0),
            make_instance("fill#0", "fill", 2.0, 4.0),
            make_wait("ship~wait#0", "ship", 0.0, 4.0),
            make_instance("ship#0", "ship", 4.0, 6.0),
        ];
        assert_eq!(run(rows), pairs(&[("ship~wait#0", "ship#0")]));
    }

    #[test]
    fn test_no_waits_no_dependencies() {
        let rows = vec![
            make_instance("load#0", "load", 0.0, 4.0),
            make_instance("ship#0", "ship", 4.0, 6.0),
        ];
        assert!(run(rows).is_empty());
    }

    #[test]
    fn test_wait_without_continuation() {
        let rows = vec![
            make_instance("load#0", "load", 0.0, 4.0),
            make_wait("ship~wait#0", "ship", 1.0, 4.0),
        ];
        assert_eq!(run(rows), pairs(&[("load#0", "ship~wait#0")]));
    }
}
