//! The Dynamics interface (C5): the contract every atomic-model behavior
//! implements. Generalizes the teacher's `Atomic` trait (`lambda`,
//! `delta_int`, `delta_ext`, `ta`, with a default `delta_conf`) by adding
//! `init`, `observation`, and `finish`, and by replacing the teacher's
//! generic-typed ports with the dynamic [`Value`] payload map the spec's
//! project-file-driven engine needs (§4.4).
//!
//! Per Design Note 3, `Dynamics` is the single capability set; the
//! Statechart ([`crate::statechart`]) and DESS ([`crate::dess`]) extensions
//! are compositional adapters that implement it rather than subclasses of
//! it.

use crate::event::ObservationEvent;
use crate::time::Time;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// The set of externals a `Dynamics::output` call produces, keyed by output
/// port name.
pub type OutputBag = BTreeMap<String, Value>;

/// Contract: `time_advance` must be a pure function of current state. All
/// transitions must be deterministic given their inputs (§4.4).
pub trait Dynamics: Debug {
    /// Returns the initial time-to-next-event (possibly `Time::INFINITY`).
    fn init(&mut self, time: Time) -> Time;

    /// Outputs emitted *before* an internal transition fires. Called only
    /// when this simulator has a pending internal event in the bag.
    fn output(&self, time: Time) -> OutputBag {
        let _ = time;
        OutputBag::new()
    }

    /// Mutates state after an internal event.
    fn internal_transition(&mut self, time: Time);

    /// Mutates state upon receipt of externals. `time - last_time` is the
    /// elapsed duration in the current state.
    fn external_transition(&mut self, elapsed: Time, events: &BTreeMap<String, Value>);

    /// Default: `internal_transition` followed by `external_transition` with
    /// zero elapsed time. Override for models that need a different
    /// confluent policy.
    fn confluent_transition(&mut self, time: Time, events: &BTreeMap<String, Value>) {
        self.internal_transition(time);
        self.external_transition(Time::ZERO, events);
    }

    /// Time to next internal event from the current state. Must be
    /// nonnegative or infinite (§8 universal invariant).
    fn time_advance(&self) -> Time;

    /// Produces a snapshot value for the requested (view, port).
    fn observation(&self, event: &ObservationEvent) -> Option<Value> {
        let _ = event;
        None
    }

    /// Releases resources. Called once, at simulation teardown.
    fn finish(&mut self) {}
}
