//! Construction-time API for the model graph, generalizing the teacher's
//! `Coupled::add_component`/`add_eic`/`add_ic`/`add_eoc`. Coupling endpoints
//! are validated immediately and, as in the teacher repo, a malformed
//! construction panics — these are programmer errors in model wiring, not
//! runtime conditions a caller recovers from (graph invariants 1-3 of §3).

use super::{ModelGraph, ModelNode, NodeId, NodeKind};
use std::collections::HashMap;

/// Declaration of an atomic leaf, not yet bound to a `Simulator`. The
/// `dynamics_name` is resolved to a `Dynamics` instance later, by
/// [`crate::factory::ModelFactory`].
pub struct AtomicSpec {
    pub name: String,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    pub dynamics_name: String,
}

impl AtomicSpec {
    pub fn new(name: impl Into<String>, dynamics_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            dynamics_name: dynamics_name.into(),
        }
    }

    pub fn with_in_port(mut self, name: impl Into<String>) -> Self {
        self.input_ports.push(name.into());
        self
    }

    pub fn with_out_port(mut self, name: impl Into<String>) -> Self {
        self.output_ports.push(name.into());
        self
    }
}

/// A child of a coupled model: either another coupled model or an atomic
/// leaf.
pub enum ChildSpec {
    Atomic(AtomicSpec),
    Coupled(CoupledSpec),
}

impl ChildSpec {
    fn name(&self) -> &str {
        match self {
            ChildSpec::Atomic(a) => &a.name,
            ChildSpec::Coupled(c) => &c.name,
        }
    }
}

/// Declaration of a coupled model: its own ports, its children, and the
/// three coupling relations named after the child/port strings (resolved to
/// [`NodeId`]s when the graph is built).
pub struct CoupledSpec {
    pub name: String,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    pub children: Vec<ChildSpec>,
    /// `(own input port, child name, child input port)`.
    eic: Vec<(String, String, String)>,
    /// `(child from, child output port, child to, child input port)`.
    ic: Vec<(String, String, String, String)>,
    /// `(child from, child output port, own output port)`.
    eoc: Vec<(String, String, String)>,
}

impl CoupledSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            children: Vec::new(),
            eic: Vec::new(),
            ic: Vec::new(),
            eoc: Vec::new(),
        }
    }

    pub fn with_in_port(mut self, name: impl Into<String>) -> Self {
        self.input_ports.push(name.into());
        self
    }

    pub fn with_out_port(mut self, name: impl Into<String>) -> Self {
        self.output_ports.push(name.into());
        self
    }

    pub fn add_atomic(&mut self, atomic: AtomicSpec) -> &mut Self {
        if self.children.iter().any(|c| c.name() == atomic.name) {
            panic!(
                "coupled model '{}' already contains a child named '{}'",
                self.name, atomic.name
            );
        }
        self.children.push(ChildSpec::Atomic(atomic));
        self
    }

    pub fn add_coupled(&mut self, coupled: CoupledSpec) -> &mut Self {
        if self.children.iter().any(|c| c.name() == coupled.name) {
            panic!(
                "coupled model '{}' already contains a child named '{}'",
                self.name, coupled.name
            );
        }
        self.children.push(ChildSpec::Coupled(coupled));
        self
    }

    /// External input coupling: the coupled model's own input port feeds a
    /// child's input port.
    pub fn add_eic(
        &mut self,
        own_port: impl Into<String>,
        child: impl Into<String>,
        child_port: impl Into<String>,
    ) -> &mut Self {
        self.eic.push((own_port.into(), child.into(), child_port.into()));
        self
    }

    /// Internal coupling: a child's output port feeds another child's input
    /// port.
    pub fn add_ic(
        &mut self,
        from_child: impl Into<String>,
        from_port: impl Into<String>,
        to_child: impl Into<String>,
        to_port: impl Into<String>,
    ) -> &mut Self {
        self.ic.push((
            from_child.into(),
            from_port.into(),
            to_child.into(),
            to_port.into(),
        ));
        self
    }

    /// External output coupling: a child's output port feeds the coupled
    /// model's own output port.
    pub fn add_eoc(
        &mut self,
        from_child: impl Into<String>,
        from_port: impl Into<String>,
        own_port: impl Into<String>,
    ) -> &mut Self {
        self.eoc
            .push((from_child.into(), from_port.into(), own_port.into()));
        self
    }
}

/// Builds the full [`ModelGraph`] from a root [`CoupledSpec`], assigning
/// arena indices in pre-order and `sim_id`s to atomic nodes in the same
/// order their `Simulator`s will be created by the factory.
pub fn build_graph(root: CoupledSpec) -> ModelGraph {
    let mut arena = Vec::new();
    let mut next_sim_id = 0usize;
    let root_id = insert_coupled(&mut arena, root, None, &mut next_sim_id);
    ModelGraph {
        arena,
        root: root_id,
    }
}

fn insert_atomic(
    arena: &mut Vec<ModelNode>,
    spec: AtomicSpec,
    parent: NodeId,
    next_sim_id: &mut usize,
) -> NodeId {
    let id = arena.len();
    let sim_id = *next_sim_id;
    *next_sim_id += 1;
    arena.push(ModelNode {
        id,
        name: spec.name,
        parent: Some(parent),
        kind: NodeKind::Atomic { sim_id },
        input_ports: spec.input_ports,
        output_ports: spec.output_ports,
        dynamics_name: spec.dynamics_name,
        children: Vec::new(),
        children_by_name: HashMap::new(),
        eic: Vec::new(),
        ic: Vec::new(),
        eoc: Vec::new(),
    });
    id
}

fn insert_coupled(
    arena: &mut Vec<ModelNode>,
    spec: CoupledSpec,
    parent: Option<NodeId>,
    next_sim_id: &mut usize,
) -> NodeId {
    let id = arena.len();
    arena.push(ModelNode {
        id,
        name: spec.name.clone(),
        parent,
        kind: NodeKind::Coupled,
        input_ports: spec.input_ports.clone(),
        output_ports: spec.output_ports.clone(),
        dynamics_name: String::new(),
        children: Vec::new(),
        children_by_name: HashMap::new(),
        eic: Vec::new(),
        ic: Vec::new(),
        eoc: Vec::new(),
    });

    let mut children = Vec::new();
    let mut children_by_name = HashMap::new();
    for child in spec.children {
        let child_name = child.name().to_string();
        let child_id = match child {
            ChildSpec::Atomic(a) => insert_atomic(arena, a, id, next_sim_id),
            ChildSpec::Coupled(c) => insert_coupled(arena, c, Some(id), next_sim_id),
        };
        children.push(child_id);
        children_by_name.insert(child_name, child_id);
    }

    let resolved_eic = spec
        .eic
        .into_iter()
        .map(|(own_port, child_name, child_port)| {
            if !arena[id].input_ports.iter().any(|p| p == &own_port) {
                panic!(
                    "coupled model '{}' has no input port named '{own_port}'",
                    arena[id].name
                );
            }
            let child_id = *children_by_name.get(&child_name).unwrap_or_else(|| {
                panic!(
                    "coupled model '{}' does not contain component '{child_name}'",
                    arena[id].name
                )
            });
            if !arena[child_id].has_input_port(&child_port) {
                panic!(
                    "component '{child_name}' does not contain input port '{child_port}'"
                );
            }
            (own_port, child_id, child_port)
        })
        .collect();

    let resolved_ic = spec
        .ic
        .into_iter()
        .map(|(from_name, from_port, to_name, to_port)| {
            let from_id = *children_by_name.get(&from_name).unwrap_or_else(|| {
                panic!(
                    "coupled model '{}' does not contain component '{from_name}'",
                    arena[id].name
                )
            });
            let to_id = *children_by_name.get(&to_name).unwrap_or_else(|| {
                panic!(
                    "coupled model '{}' does not contain component '{to_name}'",
                    arena[id].name
                )
            });
            if !arena[from_id].has_output_port(&from_port) {
                panic!("component '{from_name}' does not contain output port '{from_port}'");
            }
            if !arena[to_id].has_input_port(&to_port) {
                panic!("component '{to_name}' does not contain input port '{to_port}'");
            }
            (from_id, from_port, to_id, to_port)
        })
        .collect();

    let resolved_eoc = spec
        .eoc
        .into_iter()
        .map(|(from_name, from_port, own_port)| {
            let from_id = *children_by_name.get(&from_name).unwrap_or_else(|| {
                panic!(
                    "coupled model '{}' does not contain component '{from_name}'",
                    arena[id].name
                )
            });
            if !arena[from_id].has_output_port(&from_port) {
                panic!("component '{from_name}' does not contain output port '{from_port}'");
            }
            if !arena[id].output_ports.iter().any(|p| p == &own_port) {
                panic!(
                    "coupled model '{}' has no output port named '{own_port}'",
                    arena[id].name
                );
            }
            (from_id, from_port, own_port)
        })
        .collect();

    let node = &mut arena[id];
    node.children = children;
    node.children_by_name = children_by_name;
    node.eic = resolved_eic;
    node.ic = resolved_ic;
    node.eoc = resolved_eoc;

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "does not contain component 'missing'")]
    fn eic_rejects_unknown_child() {
        let mut root = CoupledSpec::new("top").with_in_port("input");
        root.add_eic("input", "missing", "in");
        build_graph(root);
    }

    #[test]
    #[should_panic(expected = "coupled model 'top' already contains a child named 'a'")]
    fn rejects_duplicate_child_names() {
        let mut root = CoupledSpec::new("top");
        root.add_atomic(AtomicSpec::new("a", "dyn_a"));
        root.add_atomic(AtomicSpec::new("a", "dyn_a"));
        build_graph(root);
    }

    #[test]
    fn builds_simple_two_atomic_chain() {
        let mut root = CoupledSpec::new("top").with_in_port("input").with_out_port("output");
        root.add_atomic(
            AtomicSpec::new("gen", "dyn_gen")
                .with_out_port("o"),
        );
        root.add_atomic(
            AtomicSpec::new("sink", "dyn_sink")
                .with_in_port("i"),
        );
        root.add_ic("gen", "o", "sink", "i");
        let graph = build_graph(root);
        assert_eq!(graph.arena.len(), 3);
        assert_eq!(graph.atomic_nodes().count(), 2);
    }
}
