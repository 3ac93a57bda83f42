//! Benchmark utilities.

use serde_json::json;
use storesync_core::{CoreError, EntityId, EntityStore, MemoryStore, TypeTag};
use storesync_testkit::{attrs, BatchGraph};

/// A batch where every create references the next one.
///
/// The last create is persisted first and every other foreign key is
/// deferred, which is the deepest ordering the resolver can face.
pub fn chain_graph(nodes: usize) -> BatchGraph {
    BatchGraph {
        nodes,
        edges: (1..nodes).map(|node| (node - 1, node)).collect(),
    }
}

/// A batch of layers where each create references up to `fanout` creates
/// of the layer below.
pub fn layered_graph(nodes: usize, fanout: usize) -> BatchGraph {
    let width = fanout.max(1);
    let mut edges = Vec::new();
    for holder in width..nodes {
        let layer_start = (holder / width - 1) * width;
        for target in layer_start..layer_start + width {
            edges.push((holder, target));
        }
    }
    BatchGraph { nodes, edges }
}

/// Seeds a chain of categories `1 <- 2 <- ... <- depth` linked by
/// `parent_id`.
pub fn seed_category_chain(store: &MemoryStore, depth: usize) -> Vec<EntityId> {
    let category = TypeTag::new("Category");
    store
        .transaction(|txn| {
            let mut ids: Vec<EntityId> = Vec::with_capacity(depth);
            for level in 0..depth {
                let mut row = json!({"name": format!("Level {level}")});
                if let Some(parent) = ids.last() {
                    row["parent_id"] = json!(parent.as_u64());
                }
                ids.push(txn.insert(&category, attrs(row))?);
            }
            Ok::<_, CoreError>(ids)
        })
        .expect("category chain seeds")
}
