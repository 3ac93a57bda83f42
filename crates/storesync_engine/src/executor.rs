//! Persistence executor: applies upserts and deletions.

use crate::batch::{Deletion, Upsert};
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::resolver::{self, ForeignKeyDeferral};
use crate::scope::ScopedQuery;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use storesync_core::{
    Attributes, Entity, EntityId, EntityRef, Operation, RelationKind, StoreTransaction, TempId,
    TypeTag,
};

/// Temp ids of newly created entities, mapped to their persisted ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    by_client_type: BTreeMap<String, BTreeMap<TempId, EntityId>>,
    by_cid: HashMap<TempId, (TypeTag, EntityId)>,
}

impl IdMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a created entity.
    pub fn record(&mut self, client_type: &str, type_tag: &TypeTag, cid: TempId, id: EntityId) {
        self.by_client_type
            .entry(client_type.to_string())
            .or_default()
            .insert(cid.clone(), id);
        self.by_cid.insert(cid, (type_tag.clone(), id));
    }

    /// Looks up the id assigned to a temp id under a client type.
    pub fn get(&self, client_type: &str, cid: &str) -> Option<EntityId> {
        self.by_client_type.get(client_type)?.get(cid).copied()
    }

    /// Resolves a reference of the given type to a persisted id.
    ///
    /// Temp ids must have been created in this batch with the same type.
    pub fn resolve(&self, type_tag: &TypeTag, reference: &EntityRef) -> SyncResult<EntityId> {
        match reference {
            EntityRef::Persisted(id) => Ok(*id),
            EntityRef::Pending(cid) => match self.by_cid.get(cid) {
                Some((tag, id)) if tag == type_tag => Ok(*id),
                _ => Err(SyncError::not_found(type_tag.as_str(), reference.clone())),
            },
        }
    }

    /// Returns the number of mapped temp ids.
    pub fn len(&self) -> usize {
        self.by_cid.len()
    }

    /// Returns true if nothing was created.
    pub fn is_empty(&self) -> bool {
        self.by_cid.is_empty()
    }

    /// Iterates over (client type, cid, id).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TempId, EntityId)> {
        self.by_client_type.iter().flat_map(|(client_type, ids)| {
            ids.iter()
                .map(move |(cid, id)| (client_type.as_str(), cid, *id))
        })
    }
}

/// Result of applying a batch's upserts.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    /// Temp id mapping of created entities.
    pub id_mapping: IdMapping,
    /// Created ids, in persistence order.
    pub created: Vec<(TypeTag, EntityId)>,
    /// Updated ids, in persistence order.
    pub updated: Vec<(TypeTag, EntityId)>,
}

impl CommitOutcome {
    /// Every entity the commit touched, created first.
    pub fn touched(&self) -> impl Iterator<Item = &(TypeTag, EntityId)> {
        self.created.iter().chain(self.updated.iter())
    }
}

/// Applies creates, updates and deletions under the actor's scope.
pub struct PersistenceExecutor<'a> {
    scope: ScopedQuery<'a>,
    config: &'a EngineConfig,
}

/// Working state of one upsert during a commit.
struct Slot {
    attributes: Attributes,
    saved: Option<EntityId>,
}

impl<'a> PersistenceExecutor<'a> {
    /// Creates an executor.
    pub fn new(scope: ScopedQuery<'a>, config: &'a EngineConfig) -> Self {
        Self { scope, config }
    }

    /// Persists every upsert in dependency order.
    ///
    /// A deferred foreign key is rewritten to the real id as soon as its
    /// target is saved; a holder saved before its target would be re-saved.
    pub fn commit(
        &self,
        txn: &mut dyn StoreTransaction,
        upserts: &[Upsert],
    ) -> SyncResult<CommitOutcome> {
        let plan = resolver::plan(upserts, self.config)?;

        let mut slots: Vec<Slot> = upserts
            .iter()
            .map(|upsert| Slot {
                attributes: upsert.attributes.clone(),
                saved: None,
            })
            .collect();

        // Deferral indices per holder and per target temp id.
        let mut unresolved = vec![true; plan.deferrals.len()];
        let mut by_holder: Vec<Vec<usize>> = vec![Vec::new(); upserts.len()];
        let mut by_target: HashMap<&TempId, Vec<usize>> = HashMap::new();
        for (index, deferral) in plan.deferrals.iter().enumerate() {
            by_holder[deferral.holder].push(index);
            by_target.entry(&deferral.target).or_default().push(index);
        }

        let mut outcome = CommitOutcome::default();
        for &position in &plan.order {
            let upsert = &upserts[position];
            let mut changes = slots[position].attributes.clone();
            for &index in &by_holder[position] {
                if unresolved[index] {
                    changes.remove(&plan.deferrals[index].attribute);
                }
            }

            let id = match &upsert.reference {
                EntityRef::Persisted(id) => {
                    self.update(txn, upsert, *id, &changes)?;
                    outcome.updated.push((upsert.type_tag.clone(), *id));
                    *id
                }
                EntityRef::Pending(cid) => {
                    let id = self.create(txn, upsert, cid, changes)?;
                    outcome
                        .id_mapping
                        .record(&upsert.client_type, &upsert.type_tag, cid.clone(), id);
                    outcome.created.push((upsert.type_tag.clone(), id));
                    id
                }
            };
            slots[position].saved = Some(id);

            let Some(cid) = upsert.reference.pending() else {
                continue;
            };
            for &index in by_target.get(cid).into_iter().flatten() {
                let deferral = &plan.deferrals[index];
                unresolved[index] = false;
                let slot = &mut slots[deferral.holder];
                slot.attributes
                    .insert(deferral.attribute.clone(), Value::from(id));
                if let Some(holder_id) = slot.saved {
                    self.resave(txn, &upserts[deferral.holder].type_tag, holder_id, deferral, id)?;
                }
            }
        }

        tracing::debug!(
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            "committed upserts"
        );
        Ok(outcome)
    }

    fn resave(
        &self,
        txn: &mut dyn StoreTransaction,
        type_tag: &TypeTag,
        holder_id: EntityId,
        deferral: &ForeignKeyDeferral,
        target_id: EntityId,
    ) -> SyncResult<()> {
        tracing::debug!(
            %type_tag,
            id = %holder_id,
            attribute = %deferral.attribute,
            "re-saving holder with resolved key"
        );
        let mut entity = txn
            .get(type_tag, holder_id)?
            .ok_or_else(|| SyncError::not_found(type_tag.as_str(), holder_id))?;
        entity.set(deferral.attribute.clone(), Value::from(target_id));
        txn.update(&entity)?;
        Ok(())
    }

    fn update(
        &self,
        txn: &mut dyn StoreTransaction,
        upsert: &Upsert,
        id: EntityId,
        changes: &Attributes,
    ) -> SyncResult<()> {
        let mut entity = self
            .scope
            .require(&*txn, &upsert.type_tag, Operation::Write, id)?;
        entity.apply(changes);
        self.validate(&entity, EntityRef::Persisted(id))?;
        txn.update(&entity)?;
        tracing::debug!(type_tag = %upsert.type_tag, %id, "updated");
        Ok(())
    }

    fn create(
        &self,
        txn: &mut dyn StoreTransaction,
        upsert: &Upsert,
        cid: &TempId,
        changes: Attributes,
    ) -> SyncResult<EntityId> {
        let schema = self.scope.schema(&upsert.type_tag)?;
        let mut attributes = schema.defaults().clone();
        attributes.extend(changes);

        let errors = schema.validator().validate(schema.tag(), &attributes);
        if !errors.is_empty() {
            return Err(SyncError::ValidationFailed {
                type_tag: upsert.type_tag.to_string(),
                identity: EntityRef::Pending(cid.clone()),
                errors,
            });
        }

        let id = txn.insert(&upsert.type_tag, attributes)?;
        tracing::debug!(type_tag = %upsert.type_tag, %cid, %id, "created");
        Ok(id)
    }

    fn validate(&self, entity: &Entity, identity: EntityRef) -> SyncResult<()> {
        let schema = self.scope.schema(entity.type_tag())?;
        let errors = schema.validator().validate(entity.type_tag(), entity.attributes());
        if errors.is_empty() {
            return Ok(());
        }
        Err(SyncError::ValidationFailed {
            type_tag: entity.type_tag().to_string(),
            identity,
            errors,
        })
    }

    /// Deletes entities under the remove scope.
    ///
    /// Many-to-many links on the deleted entity's side are cleared first.
    /// Returns the deleted ids.
    pub fn destroy(
        &self,
        txn: &mut dyn StoreTransaction,
        deletions: &[Deletion],
    ) -> SyncResult<Vec<(TypeTag, EntityId)>> {
        let mut deleted = Vec::with_capacity(deletions.len());
        for deletion in deletions {
            let entity = self
                .scope
                .require(&*txn, &deletion.type_tag, Operation::Remove, deletion.id)?;
            let schema = self.scope.schema(entity.type_tag())?;
            for relation in schema.relations() {
                if let RelationKind::ManyToMany { join_table, side } = &relation.kind {
                    txn.set_links(join_table, *side, deletion.id, &[])?;
                }
            }
            txn.delete(&deletion.type_tag, deletion.id)?;
            tracing::debug!(type_tag = %deletion.type_tag, id = %deletion.id, "deleted");
            deleted.push((deletion.type_tag.clone(), deletion.id));
        }
        Ok(deleted)
    }
}
