//! Dependencies caused by contention for bounded resources.
//!
//! Each object with a resource capacity is replayed on its own: every normal
//! instance that involves the object requests a slot at its start and
//! releases it at its end. A request that had to queue depends on the
//! instance whose release handed it the slot.

use crate::config::AnalysisConfig;
use crate::models::{LabelKind, RecordedActivity, SimulationObject};
use crate::recorded::RecordedActivityTable;
use crate::{log_debug, log_warning};

use super::occupancy::ResourceOccupancy;
use super::InstancePair;

/// Whether the instance used `object_id`'s resource.
fn uses_resource(instance: &RecordedActivity, object_id: &str) -> bool {
    if instance.is_wait() {
        return false;
    }
    instance.involves(object_id)
        || instance
            .label
            .as_ref()
            .is_some_and(|l| l.kind == LabelKind::Resource && l.reference == object_id)
}

pub fn resource_capacity_dependencies(
    table: &RecordedActivityTable,
    objects: &[SimulationObject],
    config: &AnalysisConfig,
) -> Vec<InstancePair> {
    let mut pairs = Vec::new();

    for object in objects {
        let capacity = match object.resource_capacity {
            None => continue,
            Some(0) => {
                log_warning!(
                    config.verbosity,
                    "object '{}' has a resource of capacity 0, skipping",
                    object.id
                );
                continue;
            }
            Some(c) => c,
        };

        // Table rows are already in (start, end, activity, id) order
        let users: Vec<&RecordedActivity> = table
            .rows()
            .iter()
            .filter(|r| uses_resource(r, &object.id))
            .collect();
        if users.len() <= capacity as usize {
            continue;
        }

        let mut occupancy = ResourceOccupancy::new(object.id.clone(), capacity, config.tolerance);
        for user in users {
            occupancy.request(user);
        }
        let peak = occupancy.peak_queue();
        let handovers = occupancy.finish();
        log_debug!(
            config.verbosity,
            "resource '{}' (capacity {}): {} handovers, longest queue {}",
            object.id,
            capacity,
            handovers.len(),
            peak
        );
        pairs.extend(handovers);
    }

    pairs
}
