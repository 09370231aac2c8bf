//! Views & observation (C9, §4.7): timed and event-driven subscriptions over
//! (model, port) pairs, each bound to an output [`crate::stream::Stream`].
//! Grounded on the original `vle::devs::View`/`vle::devs::Observable` pair,
//! generalized so the cadence lives on the view rather than needing a
//! separate scheduler entity.

use crate::event::SimId;
use crate::time::Time;

/// How a view decides when to sample.
#[derive(Debug, Clone)]
pub enum Cadence {
    /// Sampled by the Coordinator every `timestep`, starting at the view's
    /// configured begin time.
    Timed { timestep: f64 },
    /// Sampled only when a `Dynamics` explicitly requests it (not driven by
    /// the Coordinator's own clock). Out of scope for the Coordinator's loop
    /// beyond carrying the distinction; no `Dynamics` in this kernel
    /// currently triggers one.
    Event,
}

/// A configured subscription: a name, a cadence, the stream it forwards to,
/// and the set of (model, port) pairs it samples on each tick.
#[derive(Debug)]
pub struct View {
    pub name: String,
    pub cadence: Cadence,
    /// Time of the next scheduled sample; advances by `timestep` after each
    /// timed tick. Irrelevant for `Cadence::Event` views.
    pub next_sample_time: Time,
    /// (simulator, port name, display path) triples observed on each tick.
    /// The display path is precomputed at elaboration via
    /// [`crate::model::ModelGraph::path`] so the hot observation loop never
    /// walks the model tree.
    pub observed: Vec<(SimId, String, String)>,
}

impl View {
    pub fn new_timed(name: impl Into<String>, begin: Time, timestep: f64) -> Self {
        Self {
            name: name.into(),
            cadence: Cadence::Timed { timestep },
            next_sample_time: begin,
            observed: Vec::new(),
        }
    }

    pub fn new_event(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cadence: Cadence::Event,
            next_sample_time: Time::INFINITY,
            observed: Vec::new(),
        }
    }

    pub fn observe(&mut self, sim: SimId, port: impl Into<String>, display_path: impl Into<String>) {
        self.observed.push((sim, port.into(), display_path.into()));
    }

    /// True if this view is due to sample at `t` (§4.2e: "next sample time
    /// equals t"). Event views are never due via the clock.
    pub fn is_due_at(&self, t: Time) -> bool {
        matches!(self.cadence, Cadence::Timed { .. }) && self.next_sample_time == t
    }

    /// Advances `next_sample_time` by one cadence step. No-op for event
    /// views.
    pub fn advance(&mut self) {
        if let Cadence::Timed { timestep } = self.cadence {
            self.next_sample_time = self.next_sample_time + Time(timestep);
        }
    }
}
