//! The model graph (C6): a hierarchical tree of atomic and coupled models
//! with typed input/output ports and internal connections (§3 "Model").
//!
//! Generalizes the teacher's `Coupled`/`Component` pair — which wires
//! statically-typed `Rc<dyn AbstractPort>` pairs at construction time — into
//! an arena of [`ModelNode`]s addressed by index (per the "cyclic
//! references" design note) with string-named, dynamically-typed ports. The
//! coupling maps (`eic`/`ic`/`eoc`) are kept in the same "build once, reuse
//! every bag" shape the teacher uses for `eic_vec`/`ic_vec`/`eoc_vec`.

pub mod builder;
pub mod routing;

use crate::event::SimId;
use std::collections::HashMap;

/// Index of a [`ModelNode`] inside a [`ModelGraph`]'s arena. Distinct from
/// [`SimId`], which only atomic nodes have.
pub type NodeId = usize;

#[derive(Debug)]
pub enum NodeKind {
    Atomic { sim_id: SimId },
    Coupled,
}

/// One node of the model tree: either a leaf atomic model bound to a
/// `Simulator`, or a coupled container with children and connections.
#[derive(Debug)]
pub struct ModelNode {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    /// Atomic-only: the key used to look up this model's `Dynamics` factory
    /// (§4.5 "per-model-type configured library path"). Empty for coupled
    /// nodes.
    pub dynamics_name: String,

    /// Coupled-only: children in declaration order.
    pub children: Vec<NodeId>,
    pub children_by_name: HashMap<String, NodeId>,

    /// External input coupling: `(own input port, child, child input port)`.
    pub eic: Vec<(String, NodeId, String)>,
    /// Internal coupling: `(child from, child output port, child to, child input port)`.
    pub ic: Vec<(NodeId, String, NodeId, String)>,
    /// External output coupling: `(child from, child output port, own output port)`.
    pub eoc: Vec<(NodeId, String, String)>,
}

impl ModelNode {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic { .. })
    }

    pub fn sim_id(&self) -> Option<SimId> {
        match self.kind {
            NodeKind::Atomic { sim_id } => Some(sim_id),
            NodeKind::Coupled => None,
        }
    }

    pub fn has_input_port(&self, name: &str) -> bool {
        self.input_ports.iter().any(|p| p == name)
    }

    pub fn has_output_port(&self, name: &str) -> bool {
        self.output_ports.iter().any(|p| p == name)
    }
}

/// The fully elaborated model tree, plus the precomputed routing table
/// (built once at elaboration, consulted on every output phase — see
/// [`routing::RoutingTable`]).
#[derive(Debug)]
pub struct ModelGraph {
    pub arena: Vec<ModelNode>,
    pub root: NodeId,
}

impl ModelGraph {
    pub fn node(&self, id: NodeId) -> &ModelNode {
        &self.arena[id]
    }

    /// Fully qualified dotted path of a node, used for diagnostics.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = vec![self.arena[id].name.clone()];
        let mut current = self.arena[id].parent;
        while let Some(p) = current {
            parts.push(self.arena[p].name.clone());
            current = self.arena[p].parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Every atomic node in the tree, in arena order (which is elaboration
    /// order: the order `Simulator`s were created).
    pub fn atomic_nodes(&self) -> impl Iterator<Item = &ModelNode> {
        self.arena.iter().filter(|n| n.is_atomic())
    }
}
