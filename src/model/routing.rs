//! Routing (§4.3): resolves an atomic model's output port, once at
//! elaboration, to the full set of (simulator, port) pairs it feeds —
//! walking outward through the owning coupled-model chain via internal
//! couplings and internal-to-output couplings, recursing at every level.
//! Precomputed the same way the teacher precomputes `ic_vec`/`eoc_vec`: paid
//! for once, consulted on every output phase.

use super::{ModelGraph, NodeId, NodeKind};
use crate::event::SimId;
use std::collections::HashMap;

/// `(SimId, output port) -> [(SimId, input port), ...]`. Broadcast fan-out
/// and self-loops are both represented as multiple/identical entries.
pub type RoutingTable = HashMap<(SimId, String), Vec<(SimId, String)>>;

pub fn build_routing_table(graph: &ModelGraph) -> RoutingTable {
    let mut table = RoutingTable::new();
    for node in graph.atomic_nodes() {
        let sim_id = node.sim_id().expect("atomic node always has a sim_id");
        for port in &node.output_ports {
            let mut targets = Vec::new();
            resolve_from_node(graph, node.id, port, &mut targets);
            table.insert((sim_id, port.clone()), targets);
        }
    }
    table
}

/// Resolves the targets reachable from `node`'s `port`, where `node` is
/// itself a child within its parent coupled model (the common case: an
/// atomic leaf, or — during the upward recursion below — a coupled model
/// whose output just received a value via EOC).
fn resolve_from_node(
    graph: &ModelGraph,
    node_id: NodeId,
    port: &str,
    out: &mut Vec<(SimId, String)>,
) {
    let Some(parent_id) = graph.node(node_id).parent else {
        // Root model's own outputs are not routed further: nothing consumes them
        // inside the simulated hierarchy.
        return;
    };
    let parent = graph.node(parent_id);

    // Internal coupling: another child at this level receives it directly.
    for (from, from_port, to, to_port) in &parent.ic {
        if *from == node_id && from_port == port {
            route_into(graph, *to, to_port, out);
        }
    }

    // External output coupling: bubbles up to the parent's own output port;
    // continue resolving one level higher, with the parent now playing the
    // role of "the node whose port just fired".
    for (from, from_port, own_port) in &parent.eoc {
        if *from == node_id && from_port == port {
            resolve_from_node(graph, parent_id, own_port, out);
        }
    }
}

/// A value has just arrived at `node`'s `port` as an *input* (reached via an
/// IC or EIC edge). If `node` is atomic, that's a terminal target. If
/// `node` is coupled, the value enters via its own declared input port and
/// must be routed further in via its EIC table.
fn route_into(graph: &ModelGraph, node_id: NodeId, port: &str, out: &mut Vec<(SimId, String)>) {
    let node = graph.node(node_id);
    match node.kind {
        NodeKind::Atomic { sim_id } => out.push((sim_id, port.to_string())),
        NodeKind::Coupled => {
            for (own_port, child, child_port) in &node.eic {
                if own_port == port {
                    route_into(graph, *child, child_port, out);
                }
            }
        }
    }
}
