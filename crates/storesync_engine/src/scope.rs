//! Capability-scoped reads against the store.

use crate::error::{SyncError, SyncResult};
use std::collections::BTreeSet;
use storesync_core::{
    Actor, Entity, EntityId, Operation, SchemaRegistry, StoreTransaction, TypeSchema, TypeTag,
};

/// Store queries restricted to what one actor may see or change.
///
/// Every scoped access of a request goes through the same `ScopedQuery`, so
/// the actor is fixed for the request.
#[derive(Clone, Copy)]
pub struct ScopedQuery<'a> {
    registry: &'a SchemaRegistry,
    actor: Actor,
}

impl<'a> ScopedQuery<'a> {
    /// Creates a scoped query for `actor`.
    pub fn new(registry: &'a SchemaRegistry, actor: Actor) -> Self {
        Self { registry, actor }
    }

    /// Returns the actor.
    pub fn actor(&self) -> Actor {
        self.actor
    }

    /// Returns the registry.
    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    /// Returns the schema of a type.
    pub fn schema(&self, type_tag: &TypeTag) -> SyncResult<&'a TypeSchema> {
        Ok(self.registry.get(type_tag)?)
    }

    fn permits(&self, schema: &TypeSchema, operation: Operation, entity: &Entity) -> bool {
        schema.scope().permits(&self.actor, operation, entity)
    }

    /// Fetches an entity if it exists and the scope admits it.
    pub fn find(
        &self,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        operation: Operation,
        id: EntityId,
    ) -> SyncResult<Option<Entity>> {
        let schema = self.schema(type_tag)?;
        Ok(txn
            .get(type_tag, id)?
            .filter(|entity| self.permits(schema, operation, entity)))
    }

    /// Fetches an entity, failing with `NotFound` if it does not exist and
    /// `PermissionDenied` if the scope excludes it.
    pub fn require(
        &self,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        operation: Operation,
        id: EntityId,
    ) -> SyncResult<Entity> {
        let schema = self.schema(type_tag)?;
        let entity = txn
            .get(type_tag, id)?
            .ok_or_else(|| SyncError::not_found(type_tag.as_str(), id))?;
        if !self.permits(schema, operation, &entity) {
            tracing::debug!(actor = %self.actor, %operation, %type_tag, %id, "scope denied");
            return Err(SyncError::permission_denied(type_tag.as_str(), operation, id));
        }
        Ok(entity)
    }

    /// Fetches the admitted entities among `ids`, in ascending id order.
    /// Missing and excluded ids are dropped; duplicates collapse.
    pub fn where_ids(
        &self,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        operation: Operation,
        ids: &[EntityId],
    ) -> SyncResult<Vec<Entity>> {
        let schema = self.schema(type_tag)?;
        let unique: BTreeSet<EntityId> = ids.iter().copied().collect();
        let mut entities = Vec::with_capacity(unique.len());
        for id in unique {
            if let Some(entity) = txn.get(type_tag, id)? {
                if self.permits(schema, operation, &entity) {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }

    /// Fetches every admitted entity of a type, in ascending id order.
    pub fn all(
        &self,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        operation: Operation,
    ) -> SyncResult<Vec<Entity>> {
        let schema = self.schema(type_tag)?;
        Ok(txn
            .list(type_tag)?
            .into_iter()
            .filter(|entity| self.permits(schema, operation, entity))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storesync_core::{EntityStore, MemoryStore, OwnerScope};

    fn setup() -> (SchemaRegistry, MemoryStore) {
        let registry = SchemaRegistry::new()
            .with(TypeSchema::new("Note").with_scope(OwnerScope::new("owner_id").private()))
            .unwrap();
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                let note = TypeTag::new("Note");
                txn.insert(&note, json!({"owner_id": 1}).as_object().cloned().unwrap())?;
                txn.insert(&note, json!({"owner_id": 2}).as_object().cloned().unwrap())?;
                Ok::<_, SyncError>(())
            })
            .unwrap();
        (registry, store)
    }

    #[test]
    fn require_distinguishes_missing_from_denied() {
        let (registry, store) = setup();
        let scope = ScopedQuery::new(&registry, Actor::user(EntityId(1)));
        let txn = store.begin_write().unwrap();
        let note = TypeTag::new("Note");

        assert!(scope.require(&*txn, &note, Operation::Write, EntityId(1)).is_ok());
        assert!(matches!(
            scope.require(&*txn, &note, Operation::Write, EntityId(2)),
            Err(SyncError::PermissionDenied { .. })
        ));
        assert!(matches!(
            scope.require(&*txn, &note, Operation::Write, EntityId(9)),
            Err(SyncError::NotFound { .. })
        ));
        assert!(scope
            .find(&*txn, &note, Operation::Read, EntityId(2))
            .unwrap()
            .is_none());
    }

    #[test]
    fn where_ids_filters_and_dedups() {
        let (registry, store) = setup();
        let scope = ScopedQuery::new(&registry, Actor::user(EntityId(2)));
        let txn = store.begin_write().unwrap();
        let note = TypeTag::new("Note");

        let ids = [EntityId(2), EntityId(1), EntityId(2), EntityId(5)];
        let found = scope.where_ids(&*txn, &note, Operation::Read, &ids).unwrap();
        assert_eq!(found.iter().map(Entity::id).collect::<Vec<_>>(), vec![EntityId(2)]);

        let anonymous = ScopedQuery::new(&registry, Actor::anonymous());
        assert!(anonymous.all(&*txn, &note, Operation::Read).unwrap().is_empty());
    }

    #[test]
    fn unknown_type_fails() {
        let (registry, store) = setup();
        let scope = ScopedQuery::new(&registry, Actor::anonymous());
        let txn = store.begin_write().unwrap();
        assert!(matches!(
            scope.all(&*txn, &TypeTag::new("Ghost"), Operation::Read),
            Err(SyncError::UnknownType { .. })
        ));
    }
}
