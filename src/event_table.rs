//! The event table (C3): a schedule of pending internal events and
//! external-event bags keyed by time. Generalizes the teacher's per-`Simulator`
//! scalar `t_next` into a full calendar so the coordinator can extract the
//! earliest bag across the whole model graph in one step.

use crate::event::{Bag, ExternalEvent, SimId, SimulatorEvents};
use crate::time::Time;
use std::collections::BTreeMap;

/// Ordering within a bag is stable but otherwise unspecified (§4.1): ties
/// between simulators at the same time are broken by ascending `SimId`,
/// which is assigned at elaboration in insertion order. This makes the
/// "implicit tie-breaking via insertion order" open question in §9
/// reproducible: re-running the same model always yields the same order.
#[derive(Debug, Default)]
pub struct EventTable {
    /// `SimId -> scheduled internal time`. At most one outstanding internal
    /// event per simulator (§4.1).
    internals: BTreeMap<SimId, Time>,
    /// `time -> (SimId -> externals)`. A `BTreeMap` keeps times sorted so
    /// `top_time` is a cheap first-key lookup.
    externals: BTreeMap<Time, BTreeMap<SimId, Vec<ExternalEvent>>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `sim` will fire internally at `time`, replacing any
    /// prior internal event for the same simulator.
    pub fn put_internal(&mut self, sim: SimId, time: Time) {
        self.internals.insert(sim, time);
    }

    /// Removes any outstanding internal event for `sim`; used when an
    /// external event preempts a scheduled internal (the confluent case
    /// handles both without needing to cancel, but `cancel` is exposed for
    /// callers that reschedule explicitly, e.g. the Statechart extension).
    pub fn cancel(&mut self, sim: SimId) {
        self.internals.remove(&sim);
    }

    /// Appends an external event to the bag at its own time stamp.
    pub fn put_external(&mut self, event: ExternalEvent) {
        self.externals
            .entry(event.time)
            .or_default()
            .entry(event.target)
            .or_default()
            .push(event);
    }

    /// The smallest time across all pending internals and externals, or
    /// `Time::INFINITY` if the calendar is empty.
    pub fn top_time(&self) -> Time {
        let next_internal = self.internals.values().copied().min();
        let next_external = self.externals.keys().next().copied();
        match (next_internal, next_external) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => Time::INFINITY,
        }
    }

    /// Atomically removes every internal and external event at `top_time()`
    /// and groups them by target simulator into a [`Bag`].
    pub fn pop_bag(&mut self) -> (Time, Bag) {
        let t = self.top_time();
        if t.is_infinite() {
            return (t, Bag::new());
        }

        let mut bag: Bag = Bag::new();

        let due_internals: Vec<SimId> = self
            .internals
            .iter()
            .filter(|(_, &time)| time == t)
            .map(|(&sim, _)| sim)
            .collect();
        for sim in due_internals {
            self.internals.remove(&sim);
            bag.entry(sim).or_default().internal = true;
        }

        if let Some(by_sim) = self.externals.remove(&t) {
            for (sim, events) in by_sim {
                bag.entry(sim).or_default().externals.extend(events);
            }
        }

        (t, bag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn top_time_is_empty_infinity() {
        let table = EventTable::new();
        assert_eq!(table.top_time(), Time::INFINITY);
    }

    #[test]
    fn replaces_prior_internal_for_same_sim() {
        let mut table = EventTable::new();
        table.put_internal(1, Time(5.0));
        table.put_internal(1, Time(3.0));
        assert_eq!(table.top_time(), Time(3.0));
        let (t, bag) = table.pop_bag();
        assert_eq!(t, Time(3.0));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn confluent_tie_produces_single_bag_entry() {
        let mut table = EventTable::new();
        table.put_internal(1, Time(5.0));
        table.put_external(ExternalEvent::new(Time(5.0), 1, "o", "i"));
        let (t, bag) = table.pop_bag();
        assert_eq!(t, Time(5.0));
        assert_eq!(bag.len(), 1);
        assert_eq!(bag[&1].kind(), EventKind::Confluent);
    }

    #[test]
    fn pop_bag_groups_by_target_and_clears_calendar() {
        let mut table = EventTable::new();
        table.put_external(ExternalEvent::new(Time(1.0), 1, "o", "i"));
        table.put_external(ExternalEvent::new(Time(1.0), 2, "o", "i"));
        table.put_external(ExternalEvent::new(Time(2.0), 1, "o", "i"));
        let (t, bag) = table.pop_bag();
        assert_eq!(t, Time(1.0));
        assert_eq!(bag.len(), 2);
        assert_eq!(table.top_time(), Time(2.0));
    }

    #[test]
    fn cancel_removes_outstanding_internal() {
        let mut table = EventTable::new();
        table.put_internal(1, Time(5.0));
        table.cancel(1);
        assert_eq!(table.top_time(), Time::INFINITY);
    }
}
