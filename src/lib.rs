//! `devs_core`: a hierarchical DEVS (Discrete Event System Specification)
//! discrete-event simulation kernel.
//!
//! The crate is organized leaf-first, mirroring the component table of the
//! specification this kernel implements:
//!
//! - [`value`] — the typed, hierarchical `Value` tree (C1) and its XML codec.
//! - [`event`] / [`event_table`] — event types (C2) and the time-ordered
//!   calendar that schedules them (C3).
//! - [`dynamics`] — the `Dynamics` trait (C5) every atomic-model behavior
//!   implements.
//! - [`simulator`] — the per-atomic-model wrapper (C4) binding a `Dynamics`
//!   instance to its scheduling state.
//! - [`model`] — the hierarchical model graph (C6) and its precomputed
//!   routing table.
//! - [`factory`] — builds `Simulator`s from the model graph and binds
//!   `Dynamics` implementations, in-process or via a loaded plugin (C7).
//! - [`coordinator`] — the top-level run loop (C8).
//! - [`view`] / [`stream`] — observation subscriptions and their output
//!   sinks (C9).
//! - [`statechart`] — the finite-state-machine extension over `Dynamics` (C10).
//! - [`dess`] — the continuous/hybrid integrator extension over `Dynamics`.
//! - [`stochastic`] — a seeded-RNG `Dynamics` building block for models
//!   whose `time_advance` needs to draw randomly rather than hardcode a
//!   fixed period.
//! - [`project`] — the project file object model and parser (§6).
//! - [`config`] — the immutable configuration threaded through the kernel.
//! - [`error`] — the kernel's error taxonomy.

pub mod config;
pub mod coordinator;
pub mod dess;
pub mod dynamics;
pub mod error;
pub mod event;
pub mod event_table;
pub mod factory;
pub mod model;
pub mod project;
pub mod simulator;
pub mod statechart;
pub mod stochastic;
pub mod stream;
pub mod time;
pub mod value;
pub mod view;

pub use config::KernelConfig;
pub use coordinator::Coordinator;
pub use dynamics::Dynamics;
pub use error::{KernelError, Result};
pub use time::Time;
pub use value::Value;
