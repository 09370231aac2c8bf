//! Model factory (C7): builds `Simulator` instances from the model tree and
//! binds each to a `Dynamics` implementation.
//!
//! Per Design Note 2, dynamic dispatch is primarily a registry (name ->
//! factory closure) populated at startup, matching how most embedders of a
//! kernel like this actually want to work (link the behaviors in, look them
//! up by name). Loading a `Dynamics` implementation from an external shared
//! library is kept as a *separate, optional* adapter
//! ([`ModelFactory::register_plugin`]), grounded on the original
//! `ModelFactory::buildPlugin`/`attachDynamics` two-path search.

use crate::config::KernelConfig;
use crate::dynamics::Dynamics;
use crate::error::{KernelError, Result};
use crate::model::{ModelGraph, NodeKind};
use crate::simulator::Simulator;
use crate::value::Value;
use libloading::{Library, Symbol};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A plugin-provided constructor: `makeNewDynamics`-equivalent symbol type
/// (§6 "Plugin ABI"). Takes the model's dynamics name, so a single plugin
/// library can serve several model types if it chooses to, plus that
/// model's `conditions` key/value map (§6 "conditions"), mirroring how the
/// grounding example's `S::S` reads `events.get("r")` out of its own
/// condition map at construction time.
pub type DynamicsCtor = fn(&str, &BTreeMap<String, Value>) -> Box<dyn Dynamics>;

/// Creates `Simulator`s from a [`ModelGraph`], binding each atomic node's
/// `dynamics_name` to a `Dynamics` implementation obtained either from the
/// in-process registry or, if not found there, from a loaded plugin
/// library. Plugin libraries are kept alive for as long as any `Simulator`
/// built from them lives; they are dropped in reverse order of loading.
pub struct ModelFactory {
    registry: HashMap<String, DynamicsCtor>,
    /// Loaded plugin libraries, kept alive until the factory itself drops.
    /// Reverse-order teardown falls out of `Vec`'s own drop order.
    libraries: Vec<Library>,
    install_dir: PathBuf,
    user_dir: PathBuf,
}

impl ModelFactory {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            registry: HashMap::new(),
            libraries: Vec::new(),
            install_dir: config.install_plugin_dir.clone(),
            user_dir: config.user_plugin_dir.clone(),
        }
    }

    /// Registers an in-process `Dynamics` constructor under `dynamics_name`.
    /// This is the common path: most embedders link their atomic-model
    /// behaviors directly into the binary rather than loading them from a
    /// shared library at runtime.
    pub fn register(&mut self, dynamics_name: impl Into<String>, ctor: DynamicsCtor) {
        self.registry.insert(dynamics_name.into(), ctor);
    }

    /// Loads a plugin library by file name, searching the install-local
    /// directory first and the user-local directory second (§4.5), and
    /// registers the `makeNewDynamics` symbol it exposes under
    /// `dynamics_name`. Both attempted paths and the loader's own
    /// diagnostic are folded into a single [`KernelError::Load`] on
    /// failure, matching the original `ModelFactory::buildPlugin`.
    ///
    /// # Safety
    /// Loading a dynamic library executes its initializer code; the caller
    /// must trust `library_file_name`.
    pub unsafe fn register_plugin(
        &mut self,
        dynamics_name: impl Into<String>,
        library_file_name: &str,
    ) -> Result<()> {
        let dynamics_name = dynamics_name.into();
        let install_path = self.install_dir.join(library_file_name);
        let user_path = self.user_dir.join(library_file_name);

        let lib = match Library::new(&install_path) {
            Ok(lib) => lib,
            Err(install_err) => match Library::new(&user_path) {
                Ok(lib) => lib,
                Err(user_err) => {
                    return Err(KernelError::Load {
                        dynamics: dynamics_name,
                        tried: vec![
                            install_path.display().to_string(),
                            user_path.display().to_string(),
                        ],
                        cause: format!("{install_err}; {user_err}"),
                    });
                }
            },
        };

        let ctor: Symbol<DynamicsCtor> =
            lib.get(b"makeNewDynamics").map_err(|e| KernelError::Load {
                dynamics: dynamics_name.clone(),
                tried: vec![install_path.display().to_string(), user_path.display().to_string()],
                cause: format!("symbol 'makeNewDynamics' not found: {e}"),
            })?;
        // Safety: the symbol's type was asserted above; we copy the function
        // pointer out before the `Symbol` (and its borrow of `lib`) drops.
        let ctor_fn: DynamicsCtor = *ctor;
        self.registry.insert(dynamics_name, ctor_fn);
        self.libraries.push(lib);
        Ok(())
    }

    /// Builds one `Simulator` per atomic node in the graph, in the node's
    /// `sim_id` order, and returns them ready for the coordinator's arena.
    ///
    /// `conditions` is the project's per-model `<conditions>` table (§6),
    /// keyed by model name; a model with no entry gets an empty map so every
    /// constructor can unconditionally call `.get(...)`.
    pub fn elaborate(
        &self,
        graph: &ModelGraph,
        conditions: &BTreeMap<String, BTreeMap<String, Value>>,
    ) -> Result<Vec<Simulator>> {
        let empty = BTreeMap::new();
        let mut sims: Vec<Option<Simulator>> = Vec::new();
        for node in graph.atomic_nodes() {
            let NodeKind::Atomic { sim_id } = node.kind else {
                unreachable!()
            };
            if node.dynamics_name == "distant" {
                return Err(KernelError::config(format!(
                    "model '{}' requests distant dynamics, which this kernel does not implement",
                    node.name
                )));
            }
            let ctor = self.registry.get(&node.dynamics_name).ok_or_else(|| {
                KernelError::Load {
                    dynamics: node.dynamics_name.clone(),
                    tried: vec![],
                    cause: "not found in factory registry".to_string(),
                }
            })?;
            let cond = conditions.get(&node.name).unwrap_or(&empty);
            let dynamics = ctor(&node.dynamics_name, cond);
            if sim_id >= sims.len() {
                sims.resize_with(sim_id + 1, || None);
            }
            sims[sim_id] = Some(Simulator::new(node.name.clone(), dynamics));
        }
        Ok(sims.into_iter().map(|s| s.expect("every sim_id is assigned exactly once")).collect())
    }
}
