//! Property tests of commit ordering over generated dependency graphs.

use proptest::prelude::*;
use storesync_core::{Actor, EntityId, TypeTag};
use storesync_protocol::ErrorKind;
use storesync_testkit::{acyclic_graph, cyclic_graph, item_registry, BatchGraph, SyncHarness};
use storesync_testkit::{ITEM_CLIENT_TYPE, ITEM_TYPE};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn acyclic_batches_commit_targets_first(graph in acyclic_graph(16)) {
        let harness = SyncHarness::new(item_registry());
        let response = harness.apply(Actor::anonymous(), &graph.commit_request());
        prop_assert!(!response.is_error(), "{:?}", response.errors);

        let assigned = |node: usize| {
            response
                .assigned_id(ITEM_CLIENT_TYPE, &BatchGraph::cid(node))
                .map(EntityId)
        };
        prop_assert_eq!(response.models_ids[ITEM_CLIENT_TYPE].len(), graph.nodes);

        let item = TypeTag::new(ITEM_TYPE);
        for node in 0..graph.nodes {
            let id = assigned(node).unwrap();
            let entity = harness.store.get(&item, id).unwrap();
            for (k, target) in graph.targets(node).enumerate() {
                let target_id = assigned(target).unwrap();
                prop_assert!(target_id < id, "c{} saved before its target c{}", node, target);
                prop_assert_eq!(entity.reference(&format!("dep{k}_id")), Some(target_id));
            }
        }
    }

    #[test]
    fn cyclic_batches_are_rejected((graph, cycle) in cyclic_graph(10)) {
        let harness = SyncHarness::new(item_registry());
        let response = harness.apply(Actor::anonymous(), &graph.commit_request());

        let error = response.errors.as_ref().unwrap();
        prop_assert_eq!(error.kind, ErrorKind::DependencyCycle);
        for node in &cycle {
            prop_assert!(error.temp_ids.contains(&BatchGraph::cid(*node)));
        }
        prop_assert!(harness.store.is_empty());
    }
}
