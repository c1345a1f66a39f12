//! Occupancy replay of a bounded resource.
//!
//! Instance start times stand in for resource requests and end times for
//! releases. Requests that find every slot held wait in FIFO order; the next
//! release hands its slot to the head of the queue, which is recorded as a
//! dependency from the releasing instance to the waiting one.

use std::collections::VecDeque;

use crate::models::{RecordedActivity, SimTime};

use super::InstancePair;

/// A slot currently held by an instance.
#[derive(Clone, Debug)]
struct Hold<'a> {
    until: SimTime,
    holder: &'a RecordedActivity,
}

/// Replays requests and releases at one simulation object.
#[derive(Clone, Debug)]
pub struct ResourceOccupancy<'a> {
    /// Resource name (for debugging)
    pub resource_name: String,
    capacity: usize,
    tolerance: f64,
    /// Invariant: at most `capacity` entries
    holds: Vec<Hold<'a>>,
    queue: VecDeque<&'a RecordedActivity>,
    handovers: Vec<InstancePair>,
    peak_queue: usize,
}

impl<'a> ResourceOccupancy<'a> {
    pub fn new(resource_name: String, capacity: u32, tolerance: f64) -> Self {
        Self {
            resource_name,
            capacity: capacity as usize,
            tolerance,
            holds: Vec::with_capacity(capacity as usize),
            queue: VecDeque::new(),
            handovers: Vec::new(),
            peak_queue: 0,
        }
    }

    /// Number of slots in use.
    pub fn in_use(&self) -> usize {
        self.holds.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Longest queue observed so far.
    pub fn peak_queue(&self) -> usize {
        self.peak_queue
    }

    /// Release every hold ending at or before `time`, handing slots to waiters.
    pub fn advance(&mut self, time: SimTime) {
        while let Some(idx) = self.next_release(time) {
            let released = self.holds.swap_remove(idx);
            self.hand_over(released);
        }
    }

    /// Request a slot at the instance's start time.
    pub fn request(&mut self, instance: &'a RecordedActivity) {
        self.advance(instance.start);
        if self.holds.len() < self.capacity {
            self.holds.push(Hold {
                until: instance.end,
                holder: instance,
            });
        } else {
            self.queue.push_back(instance);
            self.peak_queue = self.peak_queue.max(self.queue.len());
        }
    }

    /// Drain the replay and return the inferred (releaser, waiter) pairs.
    pub fn finish(mut self) -> Vec<InstancePair> {
        self.advance(SimTime::INFINITY);
        self.handovers
    }

    /// Index of the earliest hold ending by `time` (ties by table order of start).
    fn next_release(&self, time: SimTime) -> Option<usize> {
        self.holds
            .iter()
            .enumerate()
            .filter(|(_, h)| h.until <= time + self.tolerance)
            .min_by(|(_, a), (_, b)| {
                a.until
                    .total_cmp(&b.until)
                    .then(a.holder.start.total_cmp(&b.holder.start))
                    .then_with(|| a.holder.id.cmp(&b.holder.id))
            })
            .map(|(idx, _)| idx)
    }

    fn hand_over(&mut self, released: Hold<'a>) {
        let at = released.until;
        while let Some(waiter) = self.queue.pop_front() {
            // Finished before a slot freed up: it never needed the resource
            if waiter.end < at - self.tolerance {
                continue;
            }
            self.handovers
                .push((released.holder.id.clone(), waiter.id.clone()));
            self.holds.push(Hold {
                until: waiter.end.max(at),
                holder: waiter,
            });
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::tests::make_instance;

    fn replay(capacity: u32, rows: &[RecordedActivity]) -> Vec<InstancePair> {
        let mut occupancy = ResourceOccupancy::new("quay".to_string(), capacity, 1e-6);
        for row in rows {
            occupancy.request(row);
        }
        occupancy.finish()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<InstancePair> {
        expected
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_back_to_back_use_is_not_contention() {
        let rows = vec![
            make_instance("a#0", "a", 0.0, 5.0),
            make_instance("b#0", "b", 5.0, 8.0),
        ];
        assert!(replay(1, &rows).is_empty());
    }

    #[test]
    fn test_overlapping_request_waits_for_release() {
        let rows = vec![
            make_instance("a#0", "a", 0.0, 5.0),
            make_instance("b#0", "b", 3.0, 8.0),
        ];
        assert_eq!(replay(1, &rows), pairs(&[("a#0", "b#0")]));
    }

    #[test]
    fn test_capacity_two_admits_two_users() {
        let rows = vec![
            make_instance("a#0", "a", 0.0, 5.0),
            make_instance("b#0", "b", 1.0, 6.0),
            make_instance("c#0", "c", 2.0, 9.0),
        ];
        // c waits for the first release, which is a
        assert_eq!(replay(2, &rows), pairs(&[("a#0", "c#0")]));
    }

    #[test]
    fn test_fifo_queue_chains_waiters() {
        let rows = vec![
            make_instance("a#0", "a", 0.0, 4.0),
            make_instance("b#0", "b", 1.0, 6.0),
            make_instance("c#0", "c", 2.0, 9.0),
        ];
        assert_eq!(
            replay(1, &rows),
            pairs(&[("a#0", "b#0"), ("b#0", "c#0")])
        );
    }

    #[test]
    fn test_waiter_finishing_before_release_is_dropped() {
        let rows = vec![
            make_instance("a#0", "a", 0.0, 10.0),
            make_instance("b#0", "b", 1.0, 3.0),
        ];
        assert!(replay(1, &rows).is_empty());
    }

    #[test]
    fn test_occupancy_counters() {
        let a = make_instance("a#0", "a", 0.0, 5.0);
        let b = make_instance("b#0", "b", 1.0, 6.0);
        let mut occupancy = ResourceOccupancy::new("quay".to_string(), 1, 1e-6);
        occupancy.request(&a);
        occupancy.request(&b);
        assert_eq!(occupancy.in_use(), 1);
        assert_eq!(occupancy.queued(), 1);
        occupancy.advance(5.0);
        assert_eq!(occupancy.in_use(), 1);
        assert_eq!(occupancy.queued(), 0);
        assert_eq!(occupancy.peak_queue(), 1);
    }
}
