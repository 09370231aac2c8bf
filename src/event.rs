//! Event types (C2): external, internal, observation, and request events,
//! all carrying a time stamp and referring to a target [`crate::simulator::Simulator`]
//! by its arena index (see Design Notes — no raw back-pointers).

use crate::time::Time;
use crate::value::Value;
use std::collections::BTreeMap;

/// Stable index of a [`crate::simulator::Simulator`] inside the coordinator's arena.
pub type SimId = usize;

/// An event carrying a payload from one output port to one input port,
/// already resolved to its target `Simulator` by routing (§4.3).
#[derive(Debug, Clone)]
pub struct ExternalEvent {
    pub time: Time,
    pub target: SimId,
    pub source_port: String,
    pub target_port: String,
    /// Read-only once routed: downstream `Dynamics` must not mutate a shared
    /// payload, only clone out of it.
    pub payload: BTreeMap<String, Value>,
}

impl ExternalEvent {
    pub fn new(time: Time, target: SimId, source_port: &str, target_port: &str) -> Self {
        Self {
            time,
            target,
            source_port: source_port.to_string(),
            target_port: target_port.to_string(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.payload.insert(self.target_port.clone(), value);
        self
    }
}

/// A scheduled internal event: at most one may be outstanding per `Simulator`
/// (§4.1 invariant).
#[derive(Debug, Clone, Copy)]
pub struct InternalEvent {
    pub time: Time,
    pub target: SimId,
}

/// A request to sample a (model, port) pair for a view, addressed by view
/// name + model path + port, per the original `ObservationEvent`.
#[derive(Debug, Clone)]
pub struct ObservationEvent {
    pub time: Time,
    pub view: String,
    pub model: SimId,
    pub port: String,
}

/// A synchronous query event. Out of scope beyond acknowledging its
/// existence in the type system (§3): the coordinator does not currently
/// dispatch these, but downstream extensions may construct them.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub time: Time,
    pub target: SimId,
    pub query: String,
}

/// The set of events presented together to a single `Simulator` at one time
/// instant: zero-or-one internal event, plus zero-or-more external events.
#[derive(Debug, Clone, Default)]
pub struct SimulatorEvents {
    pub internal: bool,
    pub externals: Vec<ExternalEvent>,
}

impl SimulatorEvents {
    /// Classifies this simulator's slice of the bag per §4.1.
    pub fn kind(&self) -> EventKind {
        match (self.internal, self.externals.is_empty()) {
            (true, true) => EventKind::Internal,
            (false, false) => EventKind::External,
            (true, false) => EventKind::Confluent,
            (false, true) => unreachable!("empty SimulatorEvents should never be in a bag"),
        }
    }
}

/// The classification of a `Simulator`'s events within a bag: exactly one of
/// these fires per simulator per bag (§8 universal invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Internal,
    External,
    Confluent,
}

/// The full bag extracted from the event table at one time instant: every
/// simulator with at least one pending event, keyed by `SimId`.
pub type Bag = BTreeMap<SimId, SimulatorEvents>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_pure_internal() {
        let ev = SimulatorEvents {
            internal: true,
            externals: vec![],
        };
        assert_eq!(ev.kind(), EventKind::Internal);
    }

    #[test]
    fn classifies_pure_external() {
        let ev = SimulatorEvents {
            internal: false,
            externals: vec![ExternalEvent::new(Time::ZERO, 0, "out", "in")],
        };
        assert_eq!(ev.kind(), EventKind::External);
    }

    #[test]
    fn classifies_confluent() {
        let ev = SimulatorEvents {
            internal: true,
            externals: vec![ExternalEvent::new(Time::ZERO, 0, "out", "in")],
        };
        assert_eq!(ev.kind(), EventKind::Confluent);
    }
}
