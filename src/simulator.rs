//! Per-atomic-model wrapper (C4): owns the model's `Dynamics` instance and
//! tracks `last_time`/`sigma` (time of next event). Generalizes the
//! teacher's `Component` (`t_last`/`t_next` fields on every model) into a
//! standalone arena entry addressed by [`crate::event::SimId`], per the
//! "cyclic references" design note — the coordinator owns a `Vec<Simulator>`
//! and models refer to simulators by index, never by raw pointer.

use crate::dynamics::Dynamics;
use crate::time::Time;

/// Owns a `Dynamics` trait object for exactly one atomic model. Lifetime
/// matches the model's elaboration; dropped at coordinator teardown.
pub struct Simulator {
    pub name: String,
    pub dynamics: Box<dyn Dynamics>,
    /// Time of the last transition (internal, external, or confluent).
    pub last_time: Time,
    /// Time of the next internal event (`sigma` relative to `last_time` is
    /// `t_next - last_time`). `Time::INFINITY` means none is scheduled.
    pub t_next: Time,
}

impl Simulator {
    pub fn new(name: impl Into<String>, dynamics: Box<dyn Dynamics>) -> Self {
        Self {
            name: name.into(),
            dynamics,
            last_time: Time::ZERO,
            t_next: Time::INFINITY,
        }
    }

    /// Remaining time until the next internal event, as of `last_time`.
    pub fn sigma(&self) -> Time {
        self.t_next - self.last_time
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("name", &self.name)
            .field("last_time", &self.last_time)
            .field("t_next", &self.t_next)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::test_support::TrivialGenerator;

    #[test]
    fn sigma_is_nonnegative_between_bags() {
        let mut sim = Simulator::new(
            "gen",
            Box::new(TrivialGenerator {
                port: "p".into(),
            }),
        );
        sim.last_time = Time(2.0);
        sim.t_next = Time(3.0);
        assert!(sim.sigma() >= Time::ZERO);
        sim.t_next = Time::INFINITY;
        assert!(sim.sigma().is_infinite());
    }
}
