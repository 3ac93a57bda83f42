//! Dependency graph resolver.
//!
//! Orders the upserts of a batch so that every entity referenced through a
//! temp id is persisted before the entity that references it.

use crate::batch::Upsert;
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use storesync_core::{EntityRef, TempId};

/// A foreign-key attribute whose value is still a temp id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDeferral {
    /// Batch position of the upsert holding the attribute.
    pub holder: usize,
    /// Attribute name.
    pub attribute: String,
    /// Temp id the attribute points at.
    pub target: TempId,
}

/// Directed graph over batch positions; an edge means "holder depends on
/// target".
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Creates a graph with `nodes` nodes and no edges.
    pub fn new(nodes: usize) -> Self {
        Self {
            dependencies: vec![Vec::new(); nodes],
        }
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Records that `holder` depends on `target`. Repeated edges are ignored.
    ///
    /// # Panics
    ///
    /// Panics if either node is out of range.
    pub fn add_edge(&mut self, holder: usize, target: usize) {
        assert!(target < self.len(), "target {target} out of range");
        let deps = &mut self.dependencies[holder];
        if !deps.contains(&target) {
            deps.push(target);
        }
    }

    /// Returns the nodes `node` depends on.
    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    /// Computes an order in which every target precedes its holders.
    ///
    /// Kahn's algorithm; among ready nodes the smallest goes first, so the
    /// order is deterministic and keeps batch order where it can. On failure
    /// returns the nodes lying on cycles, ascending. Nodes that are only
    /// blocked because they depend on a cycle are not reported.
    pub fn topological_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let n = self.len();
        let mut pending: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (holder, targets) in self.dependencies.iter().enumerate() {
            for &target in targets {
                dependents[target].push(holder);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| Reverse(node))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &holder in &dependents[node] {
                pending[holder] -= 1;
                if pending[holder] == 0 {
                    ready.push(Reverse(holder));
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }

        let blocked: Vec<bool> = pending.iter().map(|count| *count > 0).collect();
        Err((0..n)
            .filter(|&node| blocked[node] && self.reaches(node, node, &blocked))
            .collect())
    }

    /// Returns true if `to` is reachable from `from` in one or more steps
    /// through blocked nodes.
    fn reaches(&self, from: usize, to: usize, blocked: &[bool]) -> bool {
        let mut seen = vec![false; self.len()];
        let mut stack: Vec<usize> = self.dependencies[from].clone();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !blocked[node] || seen[node] {
                continue;
            }
            seen[node] = true;
            stack.extend_from_slice(&self.dependencies[node]);
        }
        false
    }
}

/// The resolved plan for the upserts of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    /// Batch positions in persistence order.
    pub order: Vec<usize>,
    /// Every deferred foreign key, in batch order.
    pub deferrals: Vec<ForeignKeyDeferral>,
}

/// Scans the upserts for deferred foreign keys and orders them.
///
/// A foreign key is deferred only when its value is the temp id of a create
/// in the same batch; any other string stays an ordinary attribute value.
///
/// Fails with `DuplicateTempId` if two creates share a temp id and
/// `DependencyCycle` if the references cannot be ordered.
pub fn plan(upserts: &[Upsert], config: &EngineConfig) -> SyncResult<CommitPlan> {
    let mut positions: HashMap<&TempId, usize> = HashMap::new();
    for (position, upsert) in upserts.iter().enumerate() {
        if let EntityRef::Pending(cid) = &upsert.reference {
            if positions.insert(cid, position).is_some() {
                return Err(SyncError::DuplicateTempId {
                    type_tag: upsert.type_tag.to_string(),
                    cid: cid.clone(),
                });
            }
        }
    }

    let mut graph = DependencyGraph::new(upserts.len());
    let mut deferrals = Vec::new();
    for (holder, upsert) in upserts.iter().enumerate() {
        for (attribute, value) in &upsert.attributes {
            if !config.is_foreign_key(attribute) {
                continue;
            }
            let Some(EntityRef::Pending(target)) = EntityRef::from_value(value) else {
                continue;
            };
            let Some(&position) = positions.get(&target) else {
                continue;
            };
            graph.add_edge(holder, position);
            deferrals.push(ForeignKeyDeferral {
                holder,
                attribute: attribute.clone(),
                target,
            });
        }
    }

    let order = graph.topological_order().map_err(|nodes| SyncError::DependencyCycle {
        temp_ids: nodes
            .into_iter()
            .filter_map(|node| upserts[node].reference.pending().cloned())
            .collect(),
    })?;

    tracing::debug!(?order, deferrals = deferrals.len(), "resolved commit order");
    Ok(CommitPlan { order, deferrals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storesync_core::{EntityId, TypeTag};

    fn create(cid: &str, attributes: serde_json::Value) -> Upsert {
        Upsert {
            client_type: "node".into(),
            type_tag: TypeTag::new("Node"),
            reference: EntityRef::Pending(TempId::new(cid)),
            attributes: attributes.as_object().cloned().unwrap(),
        }
    }

    fn update(id: u64, attributes: serde_json::Value) -> Upsert {
        Upsert {
            reference: EntityRef::Persisted(EntityId(id)),
            ..create("unused", attributes)
        }
    }

    fn order_of(upserts: &[Upsert]) -> SyncResult<Vec<usize>> {
        plan(upserts, &EngineConfig::default()).map(|plan| plan.order)
    }

    #[test]
    fn independent_upserts_keep_batch_order() {
        let upserts = vec![create("c1", json!({})), create("c2", json!({"title": "x"}))];
        assert_eq!(order_of(&upserts).unwrap(), vec![0, 1]);
    }

    #[test]
    fn target_precedes_holder() {
        let upserts = vec![
            create("c2", json!({"parent_id": "c1"})),
            create("c1", json!({})),
        ];
        let plan = plan(&upserts, &EngineConfig::default()).unwrap();
        assert_eq!(plan.order, vec![1, 0]);
        assert_eq!(
            plan.deferrals,
            vec![ForeignKeyDeferral {
                holder: 0,
                attribute: "parent_id".into(),
                target: TempId::new("c1"),
            }]
        );
    }

    #[test]
    fn transitive_chain_is_ordered() {
        let upserts = vec![
            create("c3", json!({"parent_id": "c2"})),
            create("c2", json!({"parent_id": "c1"})),
            create("c1", json!({})),
        ];
        assert_eq!(order_of(&upserts).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn updates_may_reference_creates() {
        let upserts = vec![update(9, json!({"author_id": "c1"})), create("c1", json!({}))];
        assert_eq!(order_of(&upserts).unwrap(), vec![1, 0]);
    }

    #[test]
    fn persisted_and_non_key_values_are_not_deferrals() {
        let upserts = vec![create(
            "c1",
            json!({"author_id": 4, "editor_id": "12", "title": "c2", "owner_id": null}),
        )];
        let plan = plan(&upserts, &EngineConfig::default()).unwrap();
        assert!(plan.deferrals.is_empty());
    }

    #[test]
    fn cycle_reports_only_cycle_members() {
        let upserts = vec![
            create("c1", json!({"next_id": "c2"})),
            create("c2", json!({"next_id": "c1"})),
            create("c3", json!({"next_id": "c1"})),
            create("c4", json!({})),
        ];
        match order_of(&upserts) {
            Err(SyncError::DependencyCycle { temp_ids }) => {
                assert_eq!(temp_ids, vec![TempId::new("c1"), TempId::new("c2")]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let upserts = vec![create("c1", json!({"parent_id": "c1"}))];
        assert!(matches!(
            order_of(&upserts),
            Err(SyncError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn string_outside_batch_is_not_deferred() {
        let upserts = vec![
            create("c1", json!({"external_id": "ABC-9"})),
            create("c2", json!({"parent_id": "c1", "source_id": "c7"})),
        ];
        let plan = plan(&upserts, &EngineConfig::default()).unwrap();
        assert_eq!(plan.order, vec![0, 1]);
        assert_eq!(plan.deferrals.len(), 1);
        assert_eq!(plan.deferrals[0].attribute, "parent_id");
    }

    #[test]
    fn duplicate_temp_id_rejected() {
        let upserts = vec![create("c1", json!({})), create("c1", json!({}))];
        assert!(matches!(
            order_of(&upserts),
            Err(SyncError::DuplicateTempId { .. })
        ));
    }

    #[test]
    fn bridge_between_cycles_not_reported() {
        // Cycles 0-1 and 3-4; node 2 sits between them without being on either.
        let mut graph = DependencyGraph::new(5);
        graph.add_edge(0, 1);
        graph.add_edge(1, 0);
        graph.add_edge(2, 1);
        graph.add_edge(3, 4);
        graph.add_edge(4, 3);
        graph.add_edge(3, 2);
        assert_eq!(graph.topological_order(), Err(vec![0, 1, 3, 4]));
    }
}
