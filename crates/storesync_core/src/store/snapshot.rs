//! Serializable export of a [`MemoryStore`].

use super::memory::{MemoryStore, StoreState};
use crate::entity::Attributes;
use crate::error::{CoreError, CoreResult};
use crate::types::{EntityId, TypeTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Plain-data copy of a store's committed contents.
///
/// Entities are flat JSON objects carrying their `id`, grouped by type tag.
/// Join tables are lists of `[left, right]` id pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Entities per type tag.
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<Attributes>>,
    /// Join tables by name.
    #[serde(default)]
    pub joins: BTreeMap<String, Vec<(EntityId, EntityId)>>,
}

impl StoreSnapshot {
    /// Returns the number of entities in the snapshot.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }
}

impl MemoryStore {
    /// Exports the committed contents.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.read_state(|state| {
            let entities = state
                .tables
                .iter()
                .filter(|(_, table)| !table.is_empty())
                .map(|(tag, table)| {
                    let rows = table
                        .iter()
                        .map(|(id, attributes)| {
                            let mut row = Attributes::new();
                            row.insert("id".into(), Value::from(*id));
                            row.extend(attributes.clone());
                            row
                        })
                        .collect();
                    (tag.to_string(), rows)
                })
                .collect();
            StoreSnapshot {
                entities,
                joins: state.joins.clone(),
            }
        })
    }

    /// Builds a store from a snapshot.
    ///
    /// Every entity must carry a unique numeric `id`. Id counters resume
    /// after the largest id of each type.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> CoreResult<Self> {
        let mut state = StoreState::default();
        for (tag, rows) in snapshot.entities {
            let type_tag = TypeTag::new(tag);
            let table = state.tables.entry(type_tag.clone()).or_default();
            for mut row in rows {
                let id = row
                    .remove("id")
                    .as_ref()
                    .and_then(EntityId::from_value)
                    .ok_or_else(|| {
                        CoreError::invalid_snapshot(format!("{type_tag} entity without id"))
                    })?;
                row.remove("cid");
                if table.insert(id, row).is_some() {
                    return Err(CoreError::invalid_snapshot(format!(
                        "duplicate id {id} for {type_tag}"
                    )));
                }
            }
            let next = table.keys().next_back().map_or(1, |id| id.as_u64() + 1);
            state.next_ids.insert(type_tag, next);
        }
        state.joins = snapshot.joins;
        Ok(Self::from_state(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityStore, StoreTransaction};
    use serde_json::json;

    #[test]
    fn snapshot_restores_contents_and_counters() {
        let snapshot: StoreSnapshot = serde_json::from_value(json!({
            "entities": {
                "Book": [{"id": 3, "title": "Dune"}, {"id": 7, "title": "Emma"}]
            },
            "joins": {"books_tags": [[3, 1]]}
        }))
        .unwrap();

        let store = MemoryStore::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(store.count(&TypeTag::new("Book")), 2);
        assert_eq!(store.join_table("books_tags"), vec![(EntityId(3), EntityId(1))]);
        assert_eq!(store.snapshot(), snapshot);

        let mut txn = store.begin_write().unwrap();
        let id = txn
            .insert(&TypeTag::new("Book"), json!({"title": "Ulysses"}).as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(id, EntityId(8));
    }

    #[test]
    fn rejects_missing_and_duplicate_ids() {
        let missing: StoreSnapshot =
            serde_json::from_value(json!({"entities": {"Book": [{"title": "x"}]}})).unwrap();
        assert!(matches!(
            MemoryStore::from_snapshot(missing),
            Err(CoreError::InvalidSnapshot { .. })
        ));

        let duplicate: StoreSnapshot = serde_json::from_value(
            json!({"entities": {"Book": [{"id": 1}, {"id": "1"}]}}),
        )
        .unwrap();
        assert!(MemoryStore::from_snapshot(duplicate).is_err());
    }
}
