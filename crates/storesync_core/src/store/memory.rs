//! In-memory transactional store.

use super::state::{PendingWrite, TransactionId, TransactionState};
use super::{EntityStore, JoinQuery, JoinRow, StoreTransaction};
use crate::entity::{Attributes, Entity};
use crate::error::{CoreError, CoreResult};
use crate::schema::{compare_values, JoinSide, RelationKind};
use crate::types::{EntityId, TypeTag};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

type Table = BTreeMap<EntityId, Attributes>;
type LinkTable = Vec<(EntityId, EntityId)>;

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub(crate) tables: BTreeMap<TypeTag, Table>,
    pub(crate) joins: BTreeMap<String, LinkTable>,
    pub(crate) next_ids: BTreeMap<TypeTag, u64>,
}

/// In-memory store with single-writer transactions.
///
/// A write transaction holds an exclusive lock for its whole lifetime and
/// buffers its writes; nothing becomes visible until commit. Dropping a
/// transaction without committing discards its writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
    next_txid: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
            next_txid: AtomicU64::new(0),
        }
    }

    pub(crate) fn read_state<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.state.read())
    }

    /// Fetches a committed entity.
    #[must_use]
    pub fn get(&self, type_tag: &TypeTag, id: EntityId) -> Option<Entity> {
        let state = self.state.read();
        state
            .tables
            .get(type_tag)
            .and_then(|table| table.get(&id))
            .map(|attributes| Entity::new(type_tag.clone(), id, attributes.clone()))
    }

    /// Returns the number of committed entities of a type.
    #[must_use]
    pub fn count(&self, type_tag: &TypeTag) -> usize {
        self.state
            .read()
            .tables
            .get(type_tag)
            .map_or(0, BTreeMap::len)
    }

    /// Returns the total number of committed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tables.values().map(BTreeMap::len).sum()
    }

    /// Returns true if the store holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the committed links of a join table.
    #[must_use]
    pub fn join_table(&self, name: &str) -> Vec<(EntityId, EntityId)> {
        self.state.read().joins.get(name).cloned().unwrap_or_default()
    }

    /// Begins a write transaction with the concrete transaction type.
    pub fn begin(&self) -> MemoryTransaction<'_> {
        let guard = self.write_lock.lock();
        let id = TransactionId(self.next_txid.fetch_add(1, Ordering::SeqCst) + 1);
        tracing::trace!(txn = %id, "begin");
        MemoryTransaction {
            store: self,
            _guard: guard,
            id,
            state: TransactionState::Active,
            writes: BTreeMap::new(),
            joins: BTreeMap::new(),
            next_ids: BTreeMap::new(),
        }
    }
}

impl EntityStore for MemoryStore {
    fn begin_write(&self) -> CoreResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(self.begin()))
    }
}

/// A write transaction over a [`MemoryStore`].
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    _guard: MutexGuard<'a, ()>,
    id: TransactionId,
    state: TransactionState,
    /// Buffered entity writes.
    writes: BTreeMap<(TypeTag, EntityId), PendingWrite>,
    /// Join tables touched by this transaction, copied on first write.
    joins: BTreeMap<String, LinkTable>,
    /// Id counters advanced by this transaction.
    next_ids: BTreeMap<TypeTag, u64>,
}

impl MemoryTransaction<'_> {
    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the number of buffered entity writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    fn current_links(&self, join_table: &str) -> LinkTable {
        match self.joins.get(join_table) {
            Some(table) => table.clone(),
            None => self.store.join_table(join_table),
        }
    }

    fn exists(&self, type_tag: &TypeTag, id: EntityId) -> bool {
        match self.writes.get(&(type_tag.clone(), id)) {
            Some(PendingWrite::Put(_)) => true,
            Some(PendingWrite::Delete) => false,
            None => self
                .store
                .state
                .read()
                .tables
                .get(type_tag)
                .is_some_and(|table| table.contains_key(&id)),
        }
    }

    fn sorted_ids(ids: &[EntityId]) -> Vec<EntityId> {
        ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
    }

    fn sort_related(&self, related: &mut [Entity], order: Option<&str>) {
        match order {
            Some(attribute) => related.sort_by(|a, b| {
                compare_values(a.get(attribute), b.get(attribute)).then(a.id().cmp(&b.id()))
            }),
            None => related.sort_by_key(Entity::id),
        }
    }

    fn join_belongs_to(&self, query: &JoinQuery, foreign_key: &str) -> CoreResult<Vec<JoinRow>> {
        let mut rows = Vec::new();
        for origin in Self::sorted_ids(&query.origin_ids) {
            let Some(entity) = self.get(&query.origin_type, origin)? else {
                continue;
            };
            if let Some(related) = entity.reference(foreign_key) {
                if self.exists(&query.related_type, related) {
                    rows.push(JoinRow::new(origin, related));
                }
            }
        }
        Ok(rows)
    }

    fn join_inverse(
        &self,
        query: &JoinQuery,
        foreign_key: &str,
        single: bool,
    ) -> CoreResult<Vec<JoinRow>> {
        let wanted: BTreeSet<EntityId> = query
            .origin_ids
            .iter()
            .copied()
            .filter(|id| self.exists(&query.origin_type, *id))
            .collect();

        let mut grouped: BTreeMap<EntityId, Vec<Entity>> = BTreeMap::new();
        for entity in self.list(&query.related_type)? {
            if let Some(origin) = entity.reference(foreign_key) {
                if wanted.contains(&origin) {
                    grouped.entry(origin).or_default().push(entity);
                }
            }
        }

        let mut rows = Vec::new();
        for (origin, mut related) in grouped {
            self.sort_related(&mut related, query.relation.order.as_deref());
            let take = if single { 1 } else { related.len() };
            rows.extend(
                related
                    .iter()
                    .take(take)
                    .map(|entity| JoinRow::new(origin, entity.id())),
            );
        }
        Ok(rows)
    }

    fn join_linked(
        &self,
        query: &JoinQuery,
        join_table: &str,
        side: JoinSide,
    ) -> CoreResult<Vec<JoinRow>> {
        let mut rows = Vec::new();
        for origin in Self::sorted_ids(&query.origin_ids) {
            if !self.exists(&query.origin_type, origin) {
                continue;
            }
            let linked = self.links(join_table, side, origin)?;
            match query.relation.order.as_deref() {
                Some(order) => {
                    let mut related = Vec::with_capacity(linked.len());
                    for id in linked {
                        if let Some(entity) = self.get(&query.related_type, id)? {
                            related.push(entity);
                        }
                    }
                    self.sort_related(&mut related, Some(order));
                    rows.extend(related.iter().map(|e| JoinRow::new(origin, e.id())));
                }
                None => rows.extend(
                    linked
                        .into_iter()
                        .filter(|id| self.exists(&query.related_type, *id))
                        .map(|id| JoinRow::new(origin, id)),
                ),
            }
        }
        Ok(rows)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get(&self, type_tag: &TypeTag, id: EntityId) -> CoreResult<Option<Entity>> {
        self.state.ensure_active()?;
        match self.writes.get(&(type_tag.clone(), id)) {
            Some(PendingWrite::Put(attributes)) => {
                Ok(Some(Entity::new(type_tag.clone(), id, attributes.clone())))
            }
            Some(PendingWrite::Delete) => Ok(None),
            None => Ok(self.store.get(type_tag, id)),
        }
    }

    fn list(&self, type_tag: &TypeTag) -> CoreResult<Vec<Entity>> {
        self.state.ensure_active()?;
        let mut table = self.store.read_state(|state| {
            state.tables.get(type_tag).cloned().unwrap_or_default()
        });

        let range = (type_tag.clone(), EntityId(0))..=(type_tag.clone(), EntityId(u64::MAX));
        for ((_, id), write) in self.writes.range(range) {
            match write {
                PendingWrite::Put(attributes) => {
                    table.insert(*id, attributes.clone());
                }
                PendingWrite::Delete => {
                    table.remove(id);
                }
            }
        }

        Ok(table
            .into_iter()
            .map(|(id, attributes)| Entity::new(type_tag.clone(), id, attributes))
            .collect())
    }

    fn insert(&mut self, type_tag: &TypeTag, attributes: Attributes) -> CoreResult<EntityId> {
        self.state.ensure_active()?;
        let store = self.store;
        let next = self.next_ids.entry(type_tag.clone()).or_insert_with(|| {
            store.read_state(|state| state.next_ids.get(type_tag).copied().unwrap_or(1))
        });
        let id = EntityId(*next);
        *next += 1;

        let entity = Entity::new(type_tag.clone(), id, attributes);
        self.writes.insert(
            (type_tag.clone(), id),
            PendingWrite::Put(entity.into_attributes()),
        );
        tracing::trace!(txn = %self.id, %type_tag, %id, "insert");
        Ok(id)
    }

    fn update(&mut self, entity: &Entity) -> CoreResult<()> {
        self.state.ensure_active()?;
        if !self.exists(entity.type_tag(), entity.id()) {
            return Err(CoreError::entity_not_found(
                entity.type_tag().as_str(),
                entity.id().as_u64(),
            ));
        }
        self.writes.insert(
            (entity.type_tag().clone(), entity.id()),
            PendingWrite::Put(entity.attributes().clone()),
        );
        tracing::trace!(txn = %self.id, type_tag = %entity.type_tag(), id = %entity.id(), "update");
        Ok(())
    }

    fn delete(&mut self, type_tag: &TypeTag, id: EntityId) -> CoreResult<bool> {
        self.state.ensure_active()?;
        if !self.exists(type_tag, id) {
            return Ok(false);
        }
        self.writes
            .insert((type_tag.clone(), id), PendingWrite::Delete);
        tracing::trace!(txn = %self.id, %type_tag, %id, "delete");
        Ok(true)
    }

    fn join(&self, query: &JoinQuery) -> CoreResult<Vec<JoinRow>> {
        self.state.ensure_active()?;
        query.check_aliases()?;
        match &query.relation.kind {
            RelationKind::BelongsTo { foreign_key } => self.join_belongs_to(query, foreign_key),
            RelationKind::HasOne { foreign_key } => self.join_inverse(query, foreign_key, true),
            RelationKind::HasMany { foreign_key } => self.join_inverse(query, foreign_key, false),
            RelationKind::ManyToMany { join_table, side } => {
                self.join_linked(query, join_table, *side)
            }
        }
    }

    fn links(&self, join_table: &str, side: JoinSide, origin: EntityId) -> CoreResult<Vec<EntityId>> {
        self.state.ensure_active()?;
        Ok(self
            .current_links(join_table)
            .into_iter()
            .filter_map(|(left, right)| match side {
                JoinSide::Left if left == origin => Some(right),
                JoinSide::Right if right == origin => Some(left),
                _ => None,
            })
            .collect())
    }

    fn set_links(
        &mut self,
        join_table: &str,
        side: JoinSide,
        origin: EntityId,
        related: &[EntityId],
    ) -> CoreResult<()> {
        self.state.ensure_active()?;
        let mut table = self.current_links(join_table);
        table.retain(|(left, right)| match side {
            JoinSide::Left => *left != origin,
            JoinSide::Right => *right != origin,
        });

        let mut seen = BTreeSet::new();
        for id in related {
            if seen.insert(*id) {
                table.push(match side {
                    JoinSide::Left => (origin, *id),
                    JoinSide::Right => (*id, origin),
                });
            }
        }
        self.joins.insert(join_table.to_string(), table);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> CoreResult<()> {
        self.state.ensure_active()?;
        let writes = std::mem::take(&mut self.writes);
        let joins = std::mem::take(&mut self.joins);
        let next_ids = std::mem::take(&mut self.next_ids);
        let write_count = writes.len();

        {
            let mut state = self.store.state.write();
            for ((type_tag, id), write) in writes {
                let table = state.tables.entry(type_tag).or_default();
                match write {
                    PendingWrite::Put(attributes) => {
                        table.insert(id, attributes);
                    }
                    PendingWrite::Delete => {
                        table.remove(&id);
                    }
                }
            }
            state.joins.extend(joins);
            state.next_ids.extend(next_ids);
        }

        self.state = TransactionState::Committed;
        tracing::debug!(txn = %self.id, writes = write_count, "commit");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> CoreResult<()> {
        self.state.ensure_active()?;
        self.state = TransactionState::RolledBack;
        tracing::debug!(txn = %self.id, discarded = self.writes.len(), "rollback");
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && !self.writes.is_empty() {
            tracing::debug!(txn = %self.id, discarded = self.writes.len(), "dropped without commit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RelationMeta, TypeSchema};
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn book() -> TypeTag {
        TypeTag::new("Book")
    }

    #[test]
    fn insert_allocates_sequential_ids() {
        let store = MemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        let a = txn.insert(&book(), attrs(json!({"title": "A"}))).unwrap();
        let b = txn.insert(&book(), attrs(json!({"title": "B"}))).unwrap();
        assert_eq!((a, b), (EntityId(1), EntityId(2)));
        txn.commit().unwrap();

        let mut txn = store.begin_write().unwrap();
        let c = txn.insert(&book(), attrs(json!({"title": "C"}))).unwrap();
        assert_eq!(c, EntityId(3));
    }

    #[test]
    fn writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        let id = txn.insert(&book(), attrs(json!({"title": "A"}))).unwrap();
        assert!(txn.get(&book(), id).unwrap().is_some());
        assert!(store.get(&book(), id).is_none());
        txn.commit().unwrap();
        assert!(store.get(&book(), id).is_some());
    }

    #[test]
    fn rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        txn.insert(&book(), attrs(json!({"title": "A"}))).unwrap();
        txn.rollback().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut txn = store.begin_write().unwrap();
            txn.insert(&book(), attrs(json!({"title": "A"}))).unwrap();
        }
        assert!(store.is_empty());
    }

    #[test]
    fn closure_transaction_rolls_back_on_error() {
        let store = MemoryStore::new();
        let result: CoreResult<()> = store.transaction(|txn| {
            txn.insert(&book(), attrs(json!({"title": "A"})))?;
            Err(CoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert!(store.is_empty());

        let id = store
            .transaction(|txn| txn.insert(&book(), attrs(json!({"title": "A"}))))
            .unwrap();
        assert!(store.get(&book(), id).is_some());
    }

    #[test]
    fn list_merges_pending_writes() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                txn.insert(&book(), attrs(json!({"title": "A"})))?;
                txn.insert(&book(), attrs(json!({"title": "B"})))?;
                Ok::<_, CoreError>(())
            })
            .unwrap();

        let mut txn = store.begin_write().unwrap();
        txn.delete(&book(), EntityId(1)).unwrap();
        txn.insert(&book(), attrs(json!({"title": "C"}))).unwrap();
        let ids: Vec<_> = txn.list(&book()).unwrap().iter().map(Entity::id).collect();
        assert_eq!(ids, vec![EntityId(2), EntityId(3)]);
    }

    #[test]
    fn update_requires_existing() {
        let store = MemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        let ghost = Entity::new(book(), EntityId(9), Attributes::new());
        assert!(matches!(
            txn.update(&ghost),
            Err(CoreError::EntityNotFound { .. })
        ));
        assert!(!txn.delete(&book(), EntityId(9)).unwrap());
    }

    #[test]
    fn links_round_trip_both_sides() {
        let store = MemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        txn.set_links("books_tags", JoinSide::Left, EntityId(1), &[EntityId(5), EntityId(6), EntityId(5)])
            .unwrap();
        txn.set_links("books_tags", JoinSide::Left, EntityId(2), &[EntityId(5)])
            .unwrap();

        assert_eq!(
            txn.links("books_tags", JoinSide::Left, EntityId(1)).unwrap(),
            vec![EntityId(5), EntityId(6)]
        );
        assert_eq!(
            txn.links("books_tags", JoinSide::Right, EntityId(5)).unwrap(),
            vec![EntityId(1), EntityId(2)]
        );
        txn.commit().unwrap();
        assert_eq!(store.join_table("books_tags").len(), 3);
    }

    #[test]
    fn join_variants() {
        let store = MemoryStore::new();
        let author = TypeSchema::new("Author").with_table("authors");
        let book_schema = TypeSchema::new("Book").with_table("books");
        let tag = TypeSchema::new("Tag").with_table("tags");

        let mut txn = store.begin_write().unwrap();
        let a1 = txn.insert(author.tag(), attrs(json!({"name": "Le Guin"}))).unwrap();
        let b1 = txn
            .insert(book_schema.tag(), attrs(json!({"title": "Lathe", "author_id": a1.as_u64(), "year": 1971})))
            .unwrap();
        let b2 = txn
            .insert(book_schema.tag(), attrs(json!({"title": "Earthsea", "author_id": a1.as_u64(), "year": 1968})))
            .unwrap();
        let t1 = txn.insert(tag.tag(), attrs(json!({"name": "fantasy"}))).unwrap();
        txn.set_links("books_tags", JoinSide::Left, b2, &[t1]).unwrap();

        let belongs = RelationMeta::belongs_to("author", "Author", "author_id");
        let rows = txn
            .join(&JoinQuery::new(&book_schema, &belongs, &author, vec![b2, b1]))
            .unwrap();
        assert_eq!(rows, vec![JoinRow::new(b1, a1), JoinRow::new(b2, a1)]);

        let has_many = RelationMeta::has_many("books", "Book", "author_id").ordered_by("year");
        let rows = txn
            .join(&JoinQuery::new(&author, &has_many, &book_schema, vec![a1]))
            .unwrap();
        assert_eq!(rows, vec![JoinRow::new(a1, b2), JoinRow::new(a1, b1)]);

        let has_one = RelationMeta::has_one("latest", "Book", "author_id");
        let rows = txn
            .join(&JoinQuery::new(&author, &has_one, &book_schema, vec![a1]))
            .unwrap();
        assert_eq!(rows, vec![JoinRow::new(a1, b1)]);

        let tags = RelationMeta::many_to_many("tags", "Tag", "books_tags", JoinSide::Left);
        let rows = txn
            .join(&JoinQuery::new(&book_schema, &tags, &tag, vec![b1, b2]))
            .unwrap();
        assert_eq!(rows, vec![JoinRow::new(b2, t1)]);
    }

    #[test]
    fn join_skips_dangling_references() {
        let store = MemoryStore::new();
        let author = TypeSchema::new("Author").with_table("authors");
        let book_schema = TypeSchema::new("Book").with_table("books");
        let mut txn = store.begin_write().unwrap();
        let b1 = txn
            .insert(book_schema.tag(), attrs(json!({"author_id": 40})))
            .unwrap();
        let belongs = RelationMeta::belongs_to("author", "Author", "author_id");
        let rows = txn
            .join(&JoinQuery::new(&book_schema, &belongs, &author, vec![b1]))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn committed_transaction_rejects_use() {
        let store = MemoryStore::new();
        let mut txn = store.begin();
        txn.state = TransactionState::Committed;
        assert!(txn.get(&book(), EntityId(1)).is_err());
    }
}
