//! Property-based test generators using proptest.
//!
//! Graphs are generated over the creates of a single batch: node `i` is the
//! create with temp id `c{i}`, and an edge `(holder, target)` is a foreign
//! key on the holder carrying the target's temp id.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use storesync_core::{SchemaRegistry, TypeSchema};
use storesync_protocol::SyncRequest;

/// Type every generated create belongs to.
pub const ITEM_TYPE: &str = "Item";

/// Client key generated creates are committed under.
pub const ITEM_CLIENT_TYPE: &str = "item";

/// Registry holding only the generated item type.
pub fn item_registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            TypeSchema::new(ITEM_TYPE)
                .with_table("items")
                .with_client_type(ITEM_CLIENT_TYPE),
        )
        .expect("item type registers")
}

/// Dependencies between the creates of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGraph {
    /// Number of creates.
    pub nodes: usize,
    /// `(holder, target)` pairs, without repeats.
    pub edges: Vec<(usize, usize)>,
}

impl BatchGraph {
    /// Temp id of a node.
    pub fn cid(node: usize) -> String {
        format!("c{node}")
    }

    /// Attribute rows of the creates, in node order.
    pub fn rows(&self) -> Vec<Value> {
        (0..self.nodes)
            .map(|node| {
                let mut row = Map::new();
                row.insert("cid".into(), json!(Self::cid(node)));
                row.insert("name".into(), json!(format!("item {node}")));
                let targets = self.edges.iter().filter(|(holder, _)| *holder == node);
                for (k, (_, target)) in targets.enumerate() {
                    row.insert(format!("dep{k}_id"), json!(Self::cid(*target)));
                }
                Value::Object(row)
            })
            .collect()
    }

    /// A request committing every create.
    pub fn commit_request(&self) -> SyncRequest {
        SyncRequest::default().with_commit(ITEM_CLIENT_TYPE, ITEM_TYPE, self.rows())
    }

    /// Targets of a node.
    pub fn targets(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |(holder, _)| *holder == node)
            .map(|(_, target)| *target)
    }
}

fn push_edge(edges: &mut Vec<(usize, usize)>, edge: (usize, usize)) {
    if !edges.contains(&edge) {
        edges.push(edge);
    }
}

/// Strategy for acyclic graphs of 1 to `max_nodes` nodes.
///
/// Nodes get a random rank; every edge points from a higher rank to a lower
/// one, so no cycle can form.
pub fn acyclic_graph(max_nodes: usize) -> impl Strategy<Value = BatchGraph> {
    (1..=max_nodes.max(1))
        .prop_flat_map(|nodes| {
            let order: Vec<usize> = (0..nodes).collect();
            (
                Just(nodes),
                Just(order).prop_shuffle(),
                prop::collection::vec((0..nodes, 0..nodes), 0..=nodes * 2),
            )
        })
        .prop_map(|(nodes, order, pairs)| {
            let mut rank = vec![0; nodes];
            for (position, node) in order.into_iter().enumerate() {
                rank[node] = position;
            }
            let mut edges = Vec::new();
            for (a, b) in pairs {
                if a == b {
                    continue;
                }
                let edge = if rank[a] > rank[b] { (a, b) } else { (b, a) };
                push_edge(&mut edges, edge);
            }
            BatchGraph { nodes, edges }
        })
}

/// Strategy for graphs with at least one cycle.
///
/// Yields the graph and the nodes of the injected cycle, in cycle order. A
/// single-node cycle is a self-reference.
pub fn cyclic_graph(max_nodes: usize) -> impl Strategy<Value = (BatchGraph, Vec<usize>)> {
    acyclic_graph(max_nodes)
        .prop_flat_map(|graph| {
            let nodes = graph.nodes;
            (
                Just(graph),
                prop::collection::vec(0..nodes, 1..=nodes.min(4)),
            )
        })
        .prop_map(|(mut graph, picked)| {
            let mut cycle: Vec<usize> = Vec::new();
            for node in picked {
                if !cycle.contains(&node) {
                    cycle.push(node);
                }
            }
            for (i, holder) in cycle.iter().enumerate() {
                let target = cycle[(i + 1) % cycle.len()];
                push_edge(&mut graph.edges, (*holder, target));
            }
            (graph, cycle)
        })
}
