//! Relation mutator: idempotent add/remove on many-valued relations.

use crate::batch::RelationChange;
use crate::error::{SyncError, SyncResult};
use crate::executor::IdMapping;
use crate::scope::ScopedQuery;
use serde_json::Value;
use storesync_core::{
    Cardinality, EntityId, JoinQuery, Operation, RelationKind, StoreTransaction, TypeTag,
};

/// Adds and removes relation members under the actor's scope.
pub struct RelationMutator<'a> {
    scope: ScopedQuery<'a>,
    ids: &'a IdMapping,
}

impl<'a> RelationMutator<'a> {
    /// Creates a mutator. Temp ids are resolved through `ids`.
    pub fn new(scope: ScopedQuery<'a>, ids: &'a IdMapping) -> Self {
        Self { scope, ids }
    }

    fn check_many(change: &RelationChange) -> SyncResult<()> {
        if change.relation.cardinality() == Cardinality::One {
            return Err(SyncError::invalid_request(format!(
                "relation {} on {} is single-valued",
                change.relation.name, change.holder_type
            )));
        }
        Ok(())
    }

    fn related_ids(&self, change: &RelationChange) -> SyncResult<Vec<EntityId>> {
        change
            .related
            .iter()
            .map(|reference| self.ids.resolve(&change.relation.target, reference))
            .collect()
    }

    /// Current members of the holder's relation, in relation order.
    fn members(
        &self,
        txn: &dyn StoreTransaction,
        change: &RelationChange,
        holder: EntityId,
    ) -> SyncResult<Vec<EntityId>> {
        let holder_schema = self.scope.schema(&change.holder_type)?;
        let related_schema = self.scope.schema(&change.relation.target)?;
        let query = JoinQuery::new(holder_schema, &change.relation, related_schema, vec![holder]);
        Ok(txn.join(&query)?.into_iter().map(|row| row.related).collect())
    }

    /// Adds the readable related entities to the holder's relation.
    ///
    /// Missing or unreadable related ids are dropped; members already present
    /// are not added twice. Returns every entity whose stored state changed.
    pub fn add(
        &self,
        txn: &mut dyn StoreTransaction,
        change: &RelationChange,
    ) -> SyncResult<Vec<(TypeTag, EntityId)>> {
        Self::check_many(change)?;
        let holder_id = self.ids.resolve(&change.holder_type, &change.holder)?;
        let related_type = &change.relation.target;

        let candidates = self.related_ids(change)?;
        let candidates =
            self.scope
                .where_ids(&*txn, related_type, Operation::Read, &candidates)?;
        self.scope
            .require(&*txn, &change.holder_type, Operation::Write, holder_id)?;

        let mut touched = vec![(change.holder_type.clone(), holder_id)];
        match &change.relation.kind {
            RelationKind::ManyToMany { join_table, side } => {
                let mut members = txn.links(join_table, *side, holder_id)?;
                let before = members.len();
                for candidate in &candidates {
                    if !members.contains(&candidate.id()) {
                        members.push(candidate.id());
                    }
                }
                if members.len() != before {
                    txn.set_links(join_table, *side, holder_id, &members)?;
                }
            }
            RelationKind::HasMany { foreign_key } => {
                for mut child in candidates {
                    if child.reference(foreign_key) == Some(holder_id) {
                        continue;
                    }
                    child.set(foreign_key.clone(), Value::from(holder_id));
                    txn.update(&child)?;
                    touched.push((related_type.clone(), child.id()));
                }
            }
            RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. } => {}
        }

        tracing::debug!(
            holder = %change.holder_type,
            id = %holder_id,
            relation = %change.relation.name,
            "relation members added"
        );
        Ok(touched)
    }

    /// Removes related ids from the holder's relation.
    ///
    /// The reduced member set is computed under the read scope and persisted
    /// under the write scope, so each can be denied on its own. Ids that are
    /// not members are ignored.
    pub fn remove(
        &self,
        txn: &mut dyn StoreTransaction,
        change: &RelationChange,
    ) -> SyncResult<Vec<(TypeTag, EntityId)>> {
        Self::check_many(change)?;
        let holder_id = self.ids.resolve(&change.holder_type, &change.holder)?;
        let removed = self.related_ids(change)?;

        self.scope
            .require(&*txn, &change.holder_type, Operation::Read, holder_id)?;
        let members = self.members(&*txn, change, holder_id)?;
        let (dropped, kept): (Vec<EntityId>, Vec<EntityId>) =
            members.into_iter().partition(|id| removed.contains(id));

        self.scope
            .require(&*txn, &change.holder_type, Operation::Write, holder_id)?;

        let mut touched = vec![(change.holder_type.clone(), holder_id)];
        if dropped.is_empty() {
            return Ok(touched);
        }
        match &change.relation.kind {
            RelationKind::ManyToMany { join_table, side } => {
                txn.set_links(join_table, *side, holder_id, &kept)?;
            }
            RelationKind::HasMany { foreign_key } => {
                let related_type = &change.relation.target;
                for id in dropped {
                    if let Some(mut child) = txn.get(related_type, id)? {
                        child.set(foreign_key.clone(), Value::Null);
                        txn.update(&child)?;
                        touched.push((related_type.clone(), id));
                    }
                }
            }
            RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. } => {}
        }

        tracing::debug!(
            holder = %change.holder_type,
            id = %holder_id,
            relation = %change.relation.name,
            "relation members removed"
        );
        Ok(touched)
    }
}
