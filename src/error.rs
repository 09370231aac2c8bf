//! Kernel-level error taxonomy.
//!
//! The coordinator never swallows a `Dynamics` failure silently: every
//! fallible path in this crate converges on [`KernelError`], which is always
//! tagged with the offending model's fully qualified name where one exists.

use std::fmt;

/// The fully qualified path of a model within the hierarchy, e.g. `top.gen.counter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelPath(pub String);

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelPath {
    fn from(s: &str) -> Self {
        ModelPath(s.to_string())
    }
}

impl From<String> for ModelPath {
    fn from(s: String) -> Self {
        ModelPath(s)
    }
}

/// The phase of the coordinator's execution cycle active when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Output,
    Transition,
    Observation,
    Finish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Output => "output",
            Phase::Transition => "transition",
            Phase::Observation => "observation",
            Phase::Finish => "finish",
        };
        write!(f, "{s}")
    }
}

/// A kernel-tagged failure. Every fallible operation in this crate returns
/// `Result<T, KernelError>`.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Malformed project, missing required field, duplicate names. Fatal,
    /// surfaced before simulation starts.
    #[error("config error: {message}")]
    Config { message: String },

    /// Plugin not found or symbol missing.
    #[error("failed to load plugin for dynamics '{dynamics}': tried {tried:?}: {cause}")]
    Load {
        dynamics: String,
        tried: Vec<String>,
        cause: String,
    },

    /// A `Dynamics` callback failed or violated its contract (e.g. negative
    /// time advance).
    #[error("runtime error in model '{model}' during {phase} at t={time}: {message}")]
    Runtime {
        model: ModelPath,
        phase: Phase,
        time: f64,
        message: String,
    },

    /// Value tree type mismatch at lookup.
    #[error("value error at '{model}' port '{port}': expected {expected}, got {actual}")]
    Value {
        model: ModelPath,
        port: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Internal bug: negative sigma, missing connection endpoint, and other
    /// conditions that should be unreachable if the kernel is correct.
    #[error("invariant violation in model '{model}': {message}")]
    Invariant { model: ModelPath, message: String },
}

impl KernelError {
    pub fn config(message: impl Into<String>) -> Self {
        KernelError::Config {
            message: message.into(),
        }
    }

    pub fn invariant(model: impl Into<ModelPath>, message: impl Into<String>) -> Self {
        KernelError::Invariant {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn runtime(
        model: impl Into<ModelPath>,
        phase: Phase,
        time: f64,
        message: impl Into<String>,
    ) -> Self {
        KernelError::Runtime {
            model: model.into(),
            phase,
            time,
            message: message.into(),
        }
    }

    /// A value tree type mismatch at lookup (§7 "ValueError"): the port held
    /// a value but not of the type the caller expected.
    pub fn value(
        model: impl Into<ModelPath>,
        port: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        KernelError::Value {
            model: model.into(),
            port: port.into(),
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
