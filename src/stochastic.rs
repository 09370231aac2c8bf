//! A small stochastic `Dynamics` building block, supplementing the
//! distilled spec per SPEC_FULL.md's "Randomness" ambient-stack entry: `rand`
//! is carried for any atomic model whose `time_advance` needs to draw from
//! the experiment's seeded RNG rather than hardcoding a fixed period.
//!
//! Grounded on the teacher's own `TrivialGenerator`-style fixed-period
//! generator (`examples/iscar-ucm-xdevs.rs`'s DEVStone processor/generator
//! pair), generalized from a constant period to a period drawn uniformly
//! from `[min_interval, max_interval)` each cycle — the classic
//! stochastic-generator shape used to stress-test a DEVS kernel's event
//! table under jittered arrivals.

use crate::config::KernelConfig;
use crate::dynamics::{Dynamics, OutputBag};
use crate::event::ObservationEvent;
use crate::time::Time;
use crate::value::Value;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

/// Emits an incrementing counter on `port` at intervals drawn uniformly from
/// `[min_interval, max_interval)`. With `min_interval == max_interval` this
/// degenerates to a fixed-period generator.
#[derive(Debug)]
pub struct RandomGenerator {
    port: String,
    min_interval: f64,
    max_interval: f64,
    rng: StdRng,
    count: i64,
    /// The already-drawn time-to-next-event. `time_advance` only ever reads
    /// this field: the draw itself happens in `init`/`internal_transition`,
    /// the only places `Dynamics` hands this type a `&mut self`.
    next_ta: Time,
}

impl RandomGenerator {
    /// `config.rng()` seeds the draw so two runs built from the same
    /// `KernelConfig` reproduce the same arrival times.
    pub fn new(port: impl Into<String>, min_interval: f64, max_interval: f64, config: &KernelConfig) -> Self {
        assert!(
            min_interval >= 0.0 && max_interval >= min_interval,
            "RandomGenerator requires 0 <= min_interval <= max_interval"
        );
        Self {
            port: port.into(),
            min_interval,
            max_interval,
            rng: config.rng(),
            count: 0,
            next_ta: Time::ZERO,
        }
    }

    fn draw_interval(&mut self) -> Time {
        if self.min_interval == self.max_interval {
            Time(self.min_interval)
        } else {
            Time(self.rng.gen_range(self.min_interval..self.max_interval))
        }
    }
}

impl Dynamics for RandomGenerator {
    fn init(&mut self, _time: Time) -> Time {
        self.next_ta = self.draw_interval();
        self.next_ta
    }

    fn output(&self, _time: Time) -> OutputBag {
        let mut bag = OutputBag::new();
        bag.insert(self.port.clone(), Value::Integer(self.count));
        bag
    }

    fn internal_transition(&mut self, _time: Time) {
        self.count += 1;
        self.next_ta = self.draw_interval();
    }

    fn external_transition(&mut self, _elapsed: Time, _events: &BTreeMap<String, Value>) {}

    fn time_advance(&self) -> Time {
        self.next_ta
    }

    fn observation(&self, event: &ObservationEvent) -> Option<Value> {
        (event.port == self.port).then_some(Value::Integer(self.count))
    }
}
