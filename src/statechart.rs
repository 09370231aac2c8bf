//! Statechart extension (C10, §4.6): a `Dynamics` implementor layered on
//! top of states/transitions/guards/timeouts, grounded on the original
//! `vle::extension::fsa::Statechart` (`process`, `processIn`,
//! `processOutStateAction`, `checkGuards`, `findTransition`).
//!
//! Execution is explicitly phased (Idle/Processing/Send), matching the
//! original's own split between detecting a firing transition and applying
//! its state change one internal event later:
//!
//! - **Idle**: waiting for the next timeout or external event.
//! - **Processing**: a transition has been found and fired (exit-action,
//!   transition-action, output buffered) but the state has not changed yet.
//! - **Send**: the buffered output is about to be emitted; the *next*
//!   `internal_transition` call applies the actual state change
//!   (entry-action, timeout recomputation).
//!
//! Declaration order breaks ties among transitions leaving the same state,
//! matching `findTransition`'s first-match-wins linear scan.

use crate::dynamics::{Dynamics, OutputBag};
use crate::event::ObservationEvent;
use crate::time::Time;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type StateId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Processing,
    Send,
}

/// When a transition out of a state becomes eligible to fire.
enum Timeout {
    /// Fires automatically, no event or guard: sigma becomes zero the
    /// instant the source state is entered.
    Immediate,
    /// Fires `duration` after the source state was entered.
    After(f64),
    /// Fires at an absolute simulation time.
    When(f64),
    /// Fires on receipt of the named input port.
    Event(String),
}

/// One edge of the statechart, built with [`StatechartBuilder::transition`].
pub struct Transition {
    from: StateId,
    to: StateId,
    timeout: Timeout,
    guard: Option<Box<dyn Fn(Time) -> bool>>,
    action: Option<Box<dyn FnMut(Time)>>,
    output: Option<Box<dyn Fn(Time) -> OutputBag>>,
}

struct StateHooks {
    entry: Option<Box<dyn FnMut(Time)>>,
    exit: Option<Box<dyn FnMut(Time)>>,
    /// Output staged on entry into this state, emitted on the very next
    /// `output()` call (before any incoming transition is required).
    entry_output: Option<Box<dyn Fn(Time) -> OutputBag>>,
}

impl Default for StateHooks {
    fn default() -> Self {
        Self {
            entry: None,
            exit: None,
            entry_output: None,
        }
    }
}

/// Builds an immutable [`Statechart`] from states and transitions declared
/// in order.
#[derive(Default)]
pub struct StatechartBuilder {
    hooks: BTreeMap<StateId, StateHooks>,
    transitions: Vec<Transition>,
    initial: StateId,
}

impl StatechartBuilder {
    pub fn new(initial: StateId) -> Self {
        Self {
            hooks: BTreeMap::new(),
            transitions: Vec::new(),
            initial,
        }
    }

    pub fn on_entry(mut self, state: StateId, action: impl FnMut(Time) + 'static) -> Self {
        self.hooks.entry(state).or_default().entry = Some(Box::new(action));
        self
    }

    pub fn on_exit(mut self, state: StateId, action: impl FnMut(Time) + 'static) -> Self {
        self.hooks.entry(state).or_default().exit = Some(Box::new(action));
        self
    }

    /// Stages an output to be emitted the moment `state` is entered, with no
    /// incoming transition required — used by states that must be observable
    /// from t=0 (the initial state) as well as from ordinary transitions.
    pub fn on_entry_output(mut self, state: StateId, output: impl Fn(Time) -> OutputBag + 'static) -> Self {
        self.hooks.entry(state).or_default().entry_output = Some(Box::new(output));
        self
    }

    fn push(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn on_event(self, from: StateId, to: StateId, port: impl Into<String>) -> Self {
        self.push(Transition {
            from,
            to,
            timeout: Timeout::Event(port.into()),
            guard: None,
            action: None,
            output: None,
        })
    }

    pub fn after(self, from: StateId, to: StateId, duration: f64) -> Self {
        self.push(Transition {
            from,
            to,
            timeout: Timeout::After(duration),
            guard: None,
            action: None,
            output: None,
        })
    }

    pub fn when(self, from: StateId, to: StateId, at: f64) -> Self {
        self.push(Transition {
            from,
            to,
            timeout: Timeout::When(at),
            guard: None,
            action: None,
            output: None,
        })
    }

    pub fn automatic(self, from: StateId, to: StateId) -> Self {
        self.push(Transition {
            from,
            to,
            timeout: Timeout::Immediate,
            guard: None,
            action: None,
            output: None,
        })
    }

    /// Attaches a guard, an action, and/or an output builder to the last
    /// transition pushed.
    pub fn with_guard(mut self, guard: impl Fn(Time) -> bool + 'static) -> Self {
        self.transitions.last_mut().expect("call after a transition").guard = Some(Box::new(guard));
        self
    }

    pub fn with_action(mut self, action: impl FnMut(Time) + 'static) -> Self {
        self.transitions.last_mut().expect("call after a transition").action = Some(Box::new(action));
        self
    }

    pub fn with_output(mut self, output: impl Fn(Time) -> OutputBag + 'static) -> Self {
        self.transitions.last_mut().expect("call after a transition").output = Some(Box::new(output));
        self
    }

    pub fn build(self) -> Statechart {
        Statechart {
            hooks: self.hooks,
            transitions: self.transitions,
            current_state: self.initial,
            phase: Phase::Idle,
            last_time: Time::ZERO,
            next_timeout_time: Time::INFINITY,
            next_timeout_transition: None,
            pending_transition: None,
            pending_output: None,
        }
    }
}

/// A `Dynamics` implementor driven by states and guarded/timed/event-driven
/// transitions. See the module docs for the Idle/Processing/Send discipline.
pub struct Statechart {
    hooks: BTreeMap<StateId, StateHooks>,
    transitions: Vec<Transition>,
    current_state: StateId,
    phase: Phase,
    last_time: Time,
    next_timeout_time: Time,
    next_timeout_transition: Option<usize>,
    /// Staged by `fire_transition`; applied (state officially changes) by
    /// the following `internal_transition` call.
    pending_transition: Option<usize>,
    pending_output: Option<OutputBag>,
}

impl fmt::Debug for Statechart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statechart")
            .field("current_state", &self.current_state)
            .field("phase", &self.phase)
            .field("last_time", &self.last_time)
            .field("next_timeout_time", &self.next_timeout_time)
            .finish()
    }
}

impl Statechart {
    pub fn current_state(&self) -> StateId {
        self.current_state
    }

    /// Scans transitions leaving `state` for the earliest-firing timeout
    /// (automatic transitions fire immediately; `after`/`when` are compared
    /// by trigger time; ties broken by declaration order), and stages it as
    /// `next_timeout_time`/`next_timeout_transition`. Event-triggered
    /// transitions play no part in this scan; they are only found reactively
    /// in [`Statechart::find_event_transition`].
    fn recompute_timeout(&mut self, entered_at: Time) {
        let mut best: Option<(Time, usize)> = None;
        for (idx, transition) in self.transitions.iter().enumerate() {
            if transition.from != self.current_state {
                continue;
            }
            let trigger = match &transition.timeout {
                Timeout::Immediate => Some(entered_at),
                Timeout::After(d) => Some(entered_at + Time(*d)),
                Timeout::When(at) => Some(Time(*at)),
                Timeout::Event(_) => None,
            };
            let Some(trigger) = trigger else { continue };
            if let Some(guard) = &transition.guard {
                if !guard(trigger) {
                    continue;
                }
            }
            if best.map(|(t, _)| trigger < t).unwrap_or(true) {
                best = Some((trigger, idx));
            }
        }
        match best {
            Some((t, idx)) => {
                self.next_timeout_time = t;
                self.next_timeout_transition = Some(idx);
            }
            None => {
                self.next_timeout_time = Time::INFINITY;
                self.next_timeout_transition = None;
            }
        }
    }

    /// Applies entry into `state`: runs its entry-action, recomputes the
    /// next timeout (`processIn`), and — if the state declares one — stages
    /// its entry output for the very next `output()` call.
    fn enter_state(&mut self, state: StateId, time: Time) {
        self.current_state = state;
        let mut staged_output = None;
        if let Some(hooks) = self.hooks.get_mut(&state) {
            if let Some(entry) = &mut hooks.entry {
                entry(time);
            }
            if let Some(build) = &hooks.entry_output {
                staged_output = Some(build(time));
            }
        }
        self.recompute_timeout(time);
        if let Some(output) = staged_output {
            self.pending_output = Some(output);
            self.phase = Phase::Send;
        }
    }

    /// Runs the exit-action of the current state, the transition's own
    /// action, and buffers its output — the Processing step. Does not
    /// change `current_state` yet.
    fn fire_transition(&mut self, idx: usize, time: Time) {
        let from = self.current_state;
        if let Some(hooks) = self.hooks.get_mut(&from) {
            if let Some(exit) = &mut hooks.exit {
                exit(time);
            }
        }
        if let Some(action) = &mut self.transitions[idx].action {
            action(time);
        }
        let output = self.transitions[idx]
            .output
            .as_ref()
            .map(|build| build(time))
            .unwrap_or_default();
        self.pending_output = Some(output);
        self.pending_transition = Some(idx);
        self.phase = Phase::Send;
    }

    fn find_event_transition(&self, time: Time, events: &BTreeMap<String, Value>) -> Option<usize> {
        self.transitions.iter().position(|transition| {
            transition.from == self.current_state
                && matches!(&transition.timeout, Timeout::Event(port) if events.contains_key(port))
                && transition.guard.as_ref().map(|g| g(time)).unwrap_or(true)
        })
    }
}

impl Dynamics for Statechart {
    fn init(&mut self, time: Time) -> Time {
        self.last_time = time;
        self.enter_state(self.current_state, time);
        self.time_advance()
    }

    fn output(&self, _time: Time) -> OutputBag {
        if self.phase == Phase::Send {
            self.pending_output.clone().unwrap_or_default()
        } else {
            OutputBag::new()
        }
    }

    fn internal_transition(&mut self, time: Time) {
        if let Some(idx) = self.pending_transition.take() {
            let to = self.transitions[idx].to;
            self.phase = Phase::Idle;
            self.pending_output = None;
            self.enter_state(to, time);
        } else if self.phase == Phase::Send {
            // Entry output staged by `enter_state` (no transition pending:
            // this is the state's own entry, not an applied transition).
            self.phase = Phase::Idle;
            self.pending_output = None;
        } else if self.next_timeout_transition.is_some() && self.next_timeout_time <= time {
            let idx = self.next_timeout_transition.unwrap();
            self.phase = Phase::Processing;
            self.fire_transition(idx, time);
        }
        self.last_time = time;
    }

    fn external_transition(&mut self, elapsed: Time, events: &BTreeMap<String, Value>) {
        let time = self.last_time + elapsed;
        if let Some(idx) = self.find_event_transition(time, events) {
            self.phase = Phase::Processing;
            self.fire_transition(idx, time);
        }
        self.last_time = time;
    }

    fn time_advance(&self) -> Time {
        if self.phase == Phase::Send {
            Time::ZERO
        } else {
            (self.next_timeout_time - self.last_time).max(Time::ZERO)
        }
    }

    fn observation(&self, event: &ObservationEvent) -> Option<Value> {
        if event.port == "state" {
            Some(Value::Integer(self.current_state as i64))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING: StateId = 0;
    const PONG: StateId = 1;

    /// Two states that toggle every time unit, each emitting a marker on its
    /// output port right before the toggle (transition-triggered output, not
    /// entry-triggered — see `entry_output_is_observable_at_startup_and_after_every_transition`
    /// for §8 scenario 3's no-incoming-transition case).
    fn ping_pong() -> Statechart {
        StatechartBuilder::new(PING)
            .after(PING, PONG, 1.0)
            .with_output(|_time| {
                let mut bag = OutputBag::new();
                bag.insert("out".to_string(), Value::String("ping".to_string()));
                bag
            })
            .after(PONG, PING, 1.0)
            .with_output(|_time| {
                let mut bag = OutputBag::new();
                bag.insert("out".to_string(), Value::String("pong".to_string()));
                bag
            })
            .build()
    }

    #[test]
    fn toggles_every_time_unit_and_emits_marker_before_switching() {
        let mut sc = ping_pong();
        let d = sc.init(Time::ZERO);
        assert_eq!(d, Time(1.0));
        assert_eq!(sc.current_state(), PING);

        // t=1: the coordinator's first bag fires the transition (exit,
        // action, output buffered) without yet changing state...
        sc.internal_transition(Time(1.0));
        assert_eq!(sc.current_state(), PING);
        assert_eq!(sc.time_advance(), Time::ZERO);

        // ...the second, same-time bag delivers the buffered output, then
        // applies the actual state change.
        let out = sc.output(Time(1.0));
        assert_eq!(out.get("out"), Some(&Value::String("ping".to_string())));
        sc.internal_transition(Time(1.0));
        assert_eq!(sc.current_state(), PONG);
        let d2 = sc.time_advance();
        assert_eq!(d2, Time(1.0));
    }

    #[test]
    fn event_triggered_transition_fires_on_matching_port() {
        let mut sc = StatechartBuilder::new(PING)
            .on_event(PING, PONG, "go")
            .build();
        sc.init(Time::ZERO);
        let mut events = BTreeMap::new();
        events.insert("go".to_string(), Value::Boolean(true));
        sc.external_transition(Time::ZERO, &events);
        assert_eq!(sc.time_advance(), Time::ZERO);
        sc.internal_transition(Time::ZERO);
        assert_eq!(sc.current_state(), PONG);
    }

    /// Drives a real `Coordinator::run()` through a statechart whose states
    /// each emit a marker the instant they are entered: state A's marker is
    /// observable at t=0 with no incoming transition, state B's after an
    /// event-triggered transition at t=1, and back to A's after a timeout at
    /// t=3 — exercising entry output both at startup and after a transition.
    #[test]
    fn entry_output_is_observable_at_startup_and_after_every_transition() {
        use crate::dynamics::Dynamics;
        use crate::model::builder::{build_graph, AtomicSpec, CoupledSpec};
        use crate::simulator::Simulator;
        use crate::{Coordinator, KernelConfig};
        use std::cell::RefCell;
        use std::rc::Rc;

        #[derive(Debug, Default)]
        struct Driver {
            fired: bool,
        }
        impl Dynamics for Driver {
            fn init(&mut self, _time: Time) -> Time {
                Time(1.0)
            }
            fn output(&self, _time: Time) -> OutputBag {
                let mut bag = OutputBag::new();
                bag.insert("trigger".to_string(), Value::Boolean(true));
                bag
            }
            fn internal_transition(&mut self, _time: Time) {
                self.fired = true;
            }
            fn external_transition(&mut self, _elapsed: Time, _events: &BTreeMap<String, Value>) {}
            fn time_advance(&self) -> Time {
                if self.fired {
                    Time::INFINITY
                } else {
                    Time(1.0)
                }
            }
        }

        #[derive(Debug)]
        struct Recorder {
            trace: Rc<RefCell<Vec<(f64, String)>>>,
            time: f64,
        }
        impl Dynamics for Recorder {
            fn init(&mut self, time: Time) -> Time {
                self.time = time.0;
                Time::INFINITY
            }
            fn internal_transition(&mut self, _time: Time) {}
            fn external_transition(&mut self, elapsed: Time, events: &BTreeMap<String, Value>) {
                self.time += elapsed.0;
                if let Some(Value::String(marker)) = events.get("out") {
                    self.trace.borrow_mut().push((self.time, marker.clone()));
                }
            }
            fn time_advance(&self) -> Time {
                Time::INFINITY
            }
        }

        const A: StateId = 0;
        const B: StateId = 1;

        let sc = StatechartBuilder::new(A)
            .on_entry_output(A, |_time| {
                let mut bag = OutputBag::new();
                bag.insert("out".to_string(), Value::String("inA".to_string()));
                bag
            })
            .on_entry_output(B, |_time| {
                let mut bag = OutputBag::new();
                bag.insert("out".to_string(), Value::String("inB".to_string()));
                bag
            })
            .on_event(A, B, "go")
            .after(B, A, 2.0)
            .build();

        let trace = Rc::new(RefCell::new(Vec::new()));

        let mut root = CoupledSpec::new("top");
        root.add_atomic(AtomicSpec::new("driver", "driver").with_out_port("trigger"));
        root.add_atomic(
            AtomicSpec::new("sc", "sc")
                .with_in_port("go")
                .with_out_port("out"),
        );
        root.add_atomic(AtomicSpec::new("rec", "rec").with_in_port("out"));
        root.add_ic("driver", "trigger", "sc", "go");
        root.add_ic("sc", "out", "rec", "out");
        let graph = build_graph(root);

        let sims = vec![
            Simulator::new("driver", Box::new(Driver::default())),
            Simulator::new("sc", Box::new(sc)),
            Simulator::new(
                "rec",
                Box::new(Recorder {
                    trace: Rc::clone(&trace),
                    time: 0.0,
                }),
            ),
        ];
        let config = KernelConfig::new("exp", 0.0, 5.0);
        let mut coordinator = Coordinator::new(graph, sims, vec![], vec![], config);
        coordinator.run().unwrap();

        assert_eq!(
            *trace.borrow(),
            vec![
                (0.0, "inA".to_string()),
                (1.0, "inB".to_string()),
                (3.0, "inA".to_string()),
            ]
        );
    }

    #[test]
    fn guard_suppresses_automatic_transition() {
        let mut sc = StatechartBuilder::new(PING)
            .automatic(PING, PONG)
            .with_guard(|_time| false)
            .build();
        sc.init(Time::ZERO);
        assert_eq!(sc.current_state(), PING);
        assert!(sc.time_advance().is_infinite());
    }
}
