//! DESS (continuous/hybrid) adapter, supplementing the base Dynamics
//! interface per `original_source/src/examples/dess/S.cpp`: a state vector
//! integrated forward in fixed steps via user-supplied derivatives,
//! re-exposed as an ordinary `Dynamics` so it composes with the rest of the
//! kernel exactly like any other atomic model (Design Note 3: extensions are
//! compositional adapters, not a parallel execution path).
//!
//! The integration method is a fixed-step forward Euler — the simplest
//! scheme that keeps the adapter's contract (one `Dynamics::output` call per
//! step) and is sufficient for the decay-system fixture this module exists
//! to support (§8 scenario 2: `dS/dt = -r * S * I`).

use crate::dynamics::{Dynamics, OutputBag};
use crate::error::{KernelError, Result};
use crate::event::ObservationEvent;
use crate::time::Time;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Computes the derivative of a DESS model's state vector given the current
/// state and the most recently received external inputs. `model` is the
/// owning `Dess`'s name, threaded through so a type-mismatched input port
/// can report a properly tagged [`KernelError::Value`].
pub trait Derivative {
    fn derivative(
        &self,
        time: Time,
        state: &[f64],
        inputs: &BTreeMap<String, Value>,
        model: &str,
    ) -> Result<Vec<f64>>;
}

impl<F> Derivative for F
where
    F: Fn(Time, &[f64], &BTreeMap<String, Value>, &str) -> Result<Vec<f64>>,
{
    fn derivative(
        &self,
        time: Time,
        state: &[f64],
        inputs: &BTreeMap<String, Value>,
        model: &str,
    ) -> Result<Vec<f64>> {
        self(time, state, inputs, model)
    }
}

/// A continuous atomic model integrated with fixed-step Euler, exposing
/// each state vector component on its own named output port.
pub struct Dess<D: Derivative> {
    name: String,
    derivative: D,
    state: Vec<f64>,
    /// Index-aligned with `state`: the output port each component is
    /// reported on.
    ports: Vec<String>,
    step: f64,
    inputs: BTreeMap<String, Value>,
    last_time: Time,
}

impl<D: Derivative> fmt::Debug for Dess<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dess")
            .field("state", &self.state)
            .field("ports", &self.ports)
            .field("step", &self.step)
            .field("last_time", &self.last_time)
            .finish()
    }
}

impl<D: Derivative> Dess<D> {
    /// `ports[i]` names the output (and observation) port for `initial_state[i]`.
    pub fn new(
        name: impl Into<String>,
        derivative: D,
        initial_state: Vec<f64>,
        ports: Vec<String>,
        step: f64,
    ) -> Self {
        assert_eq!(
            initial_state.len(),
            ports.len(),
            "one output port per state component"
        );
        assert!(step > 0.0, "DESS integration step must be positive");
        Self {
            name: name.into(),
            derivative,
            state: initial_state,
            ports,
            step,
            inputs: BTreeMap::new(),
            last_time: Time::ZERO,
        }
    }

    fn port_index(&self, port: &str) -> Option<usize> {
        self.ports.iter().position(|p| p == port)
    }

    /// Advances the state vector by `dt` using the derivative evaluated at
    /// the start of the interval (forward Euler) against the currently held
    /// inputs.
    fn integrate(&mut self, time: Time, dt: f64) -> Result<()> {
        if dt <= 0.0 {
            return Ok(());
        }
        let d = self
            .derivative
            .derivative(time, &self.state, &self.inputs, &self.name)?;
        for (x, dx) in self.state.iter_mut().zip(d.iter()) {
            *x += dt * dx;
        }
        Ok(())
    }
}

impl<D: Derivative> Dynamics for Dess<D> {
    fn init(&mut self, time: Time) -> Time {
        self.last_time = time;
        Time(self.step)
    }

    fn output(&self, _time: Time) -> OutputBag {
        let mut bag = OutputBag::new();
        for (value, port) in self.state.iter().zip(self.ports.iter()) {
            bag.insert(port.clone(), Value::Double(*value));
        }
        bag
    }

    fn internal_transition(&mut self, time: Time) {
        let elapsed = (time - self.last_time).into();
        // `Dynamics::internal_transition` is infallible; a derivative error
        // (malformed input value) is surfaced as a panic, which the
        // coordinator's `catch_unwind` guard converts into a `KernelError`.
        self.integrate(self.last_time, elapsed)
            .unwrap_or_else(|e| panic!("{e}"));
        self.last_time = time;
    }

    fn external_transition(&mut self, elapsed: Time, events: &BTreeMap<String, Value>) {
        let time = self.last_time;
        self.integrate(time, elapsed.into())
            .unwrap_or_else(|e| panic!("{e}"));
        self.inputs.extend(events.clone());
        self.last_time = time + elapsed;
    }

    fn time_advance(&self) -> Time {
        Time(self.step)
    }

    fn observation(&self, event: &ObservationEvent) -> Option<Value> {
        self.port_index(&event.port)
            .map(|idx| Value::Double(self.state[idx]))
    }
}
