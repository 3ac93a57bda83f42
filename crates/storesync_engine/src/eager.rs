//! Eager relation graph loader.
//!
//! Expands a set of returned entities across their types' eager relations
//! until no new (type, id) pair turns up. A visited set shared by every
//! expansion of a request keeps each pair from being expanded twice, which
//! is what makes cyclic relation declarations terminate.

use crate::error::SyncResult;
use crate::scope::ScopedQuery;
use std::collections::{BTreeMap, HashSet, VecDeque};
use storesync_core::{Entity, EntityId, JoinQuery, Operation, StoreTransaction, TypeTag};

/// Origin id → related ids for one relation, plus the attribute the client
/// reassembles it under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationIndex {
    attribute: String,
    models: BTreeMap<EntityId, Vec<EntityId>>,
}

impl RelationIndex {
    /// Creates an empty index.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            models: BTreeMap::new(),
        }
    }

    /// Returns the relation attribute.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns the related ids of an origin.
    pub fn get(&self, origin: EntityId) -> Option<&[EntityId]> {
        self.models.get(&origin).map(Vec::as_slice)
    }

    /// Iterates over origins and their related ids.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &[EntityId])> {
        self.models.iter().map(|(origin, related)| (*origin, related.as_slice()))
    }

    /// Ensures an origin has an entry, possibly empty.
    pub fn touch(&mut self, origin: EntityId) {
        self.models.entry(origin).or_default();
    }

    /// Appends a related id to an origin unless already present.
    pub fn push(&mut self, origin: EntityId, related: EntityId) {
        let entry = self.models.entry(origin).or_default();
        if !entry.contains(&related) {
            entry.push(related);
        }
    }

    /// Merges another index: lists of the same origin are joined in order
    /// without repeating ids.
    pub fn merge(&mut self, other: RelationIndex) {
        for (origin, related) in other.models {
            self.touch(origin);
            for id in related {
                self.push(origin, id);
            }
        }
    }

    /// Returns the number of origins.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if no origin has an entry.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Relation indices keyed origin key → related key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationIndexSet {
    indices: BTreeMap<String, BTreeMap<String, RelationIndex>>,
}

impl RelationIndexSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for a key pair, creating it with `attribute`.
    ///
    /// An existing index keeps the attribute it was created with.
    pub fn entry(&mut self, origin: &str, related: &str, attribute: &str) -> &mut RelationIndex {
        self.indices
            .entry(origin.to_string())
            .or_default()
            .entry(related.to_string())
            .or_insert_with(|| RelationIndex::new(attribute))
    }

    /// Returns the index for a key pair.
    pub fn get(&self, origin: &str, related: &str) -> Option<&RelationIndex> {
        self.indices.get(origin)?.get(related)
    }

    /// Merges another set into this one.
    pub fn merge(&mut self, other: RelationIndexSet) {
        for (origin, by_related) in other.indices {
            for (related, index) in by_related {
                let attribute = index.attribute.clone();
                self.entry(&origin, &related, &attribute).merge(index);
            }
        }
    }

    /// Iterates over (origin key, related key, index).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &RelationIndex)> {
        self.indices.iter().flat_map(|(origin, by_related)| {
            by_related
                .iter()
                .map(move |(related, index)| (origin.as_str(), related.as_str(), index))
        })
    }

    /// Returns true if the set holds no index.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Entities discovered by an expansion, with the relation indices recorded
/// along the way.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Discovered entities per type, in discovery order. Never includes the
    /// roots.
    pub entities: BTreeMap<TypeTag, Vec<Entity>>,
    /// Relation indices of many-to-many and has-one relations.
    pub relations: RelationIndexSet,
}

impl Expansion {
    /// Returns the number of discovered entities.
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }
}

/// Eager loader with a visited set spanning one request.
#[derive(Debug, Default)]
pub struct EagerLoader {
    visited: HashSet<(TypeTag, EntityId)>,
}

impl EagerLoader {
    /// Creates a loader with an empty visited set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a pair has been expanded or discovered.
    pub fn is_visited(&self, type_tag: &TypeTag, id: EntityId) -> bool {
        self.visited.contains(&(type_tag.clone(), id))
    }

    /// Returns the number of visited pairs.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Expands `ids` of `type_tag`, which the caller is already returning.
    ///
    /// Roots that were visited before are not expanded again.
    pub fn expand(
        &mut self,
        scope: &ScopedQuery<'_>,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        ids: &[EntityId],
    ) -> SyncResult<Expansion> {
        let roots = self.mark(type_tag, ids);
        let mut frontier: VecDeque<(TypeTag, Vec<EntityId>)> = VecDeque::new();
        if !roots.is_empty() {
            frontier.push_back((type_tag.clone(), roots));
        }

        let mut discovered: BTreeMap<TypeTag, Vec<EntityId>> = BTreeMap::new();
        let mut relations = RelationIndexSet::new();

        while let Some((current, ids)) = frontier.pop_front() {
            let schema = scope.schema(&current)?;
            if schema.eager_relations().is_empty() || ids.is_empty() {
                continue;
            }
            let origin_ids: Vec<EntityId> = scope
                .where_ids(txn, &current, Operation::Read, &ids)?
                .iter()
                .map(Entity::id)
                .collect();
            if origin_ids.is_empty() {
                continue;
            }

            for name in schema.eager_relations() {
                let relation = schema.relation(name)?;
                let related_schema = scope.schema(&relation.target)?;
                let query = JoinQuery::new(schema, relation, related_schema, origin_ids.clone());
                let rows = txn.join(&query)?;
                tracing::debug!(query = %query.describe(), rows = rows.len(), "eager join");

                if relation.is_indexed() {
                    let index = relations.entry(
                        current.as_str(),
                        relation.target.as_str(),
                        &relation.name,
                    );
                    for row in &rows {
                        index.push(row.origin, row.related);
                    }
                }

                let related: Vec<EntityId> = rows.iter().map(|row| row.related).collect();
                let fresh = self.mark(&relation.target, &related);
                if !fresh.is_empty() {
                    discovered
                        .entry(relation.target.clone())
                        .or_default()
                        .extend(fresh.iter().copied());
                    frontier.push_back((relation.target.clone(), fresh));
                }
            }
        }

        let mut entities = BTreeMap::new();
        for (related_type, ids) in discovered {
            let found = scope.where_ids(txn, &related_type, Operation::Read, &ids)?;
            if !found.is_empty() {
                entities.insert(related_type, found);
            }
        }

        let expansion = Expansion {
            entities,
            relations,
        };
        tracing::debug!(
            root = %type_tag,
            roots = ids.len(),
            discovered = expansion.entity_count(),
            "eager expansion"
        );
        Ok(expansion)
    }

    /// Marks pairs visited and returns the ids that were not, in order.
    fn mark(&mut self, type_tag: &TypeTag, ids: &[EntityId]) -> Vec<EntityId> {
        ids.iter()
            .copied()
            .filter(|id| self.visited.insert((type_tag.clone(), *id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_merge_is_ordered_union() {
        let mut a = RelationIndex::new("tags");
        a.push(EntityId(1), EntityId(3));
        a.push(EntityId(1), EntityId(4));

        let mut b = RelationIndex::new("tags");
        b.push(EntityId(1), EntityId(4));
        b.push(EntityId(1), EntityId(5));
        b.touch(EntityId(2));

        a.merge(b);
        assert_eq!(a.get(EntityId(1)), Some(&[EntityId(3), EntityId(4), EntityId(5)][..]));
        assert_eq!(a.get(EntityId(2)), Some(&[][..]));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn index_set_keeps_first_attribute() {
        let mut set = RelationIndexSet::new();
        set.entry("Book", "Tag", "tags").push(EntityId(1), EntityId(2));

        let mut other = RelationIndexSet::new();
        other.entry("Book", "Tag", "labels").push(EntityId(1), EntityId(3));
        set.merge(other);

        let index = set.get("Book", "Tag").unwrap();
        assert_eq!(index.attribute(), "tags");
        assert_eq!(index.get(EntityId(1)), Some(&[EntityId(2), EntityId(3)][..]));
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn mark_filters_visited() {
        let mut loader = EagerLoader::new();
        let tag = TypeTag::new("Book");
        assert_eq!(loader.mark(&tag, &[EntityId(1), EntityId(2), EntityId(1)]), vec![EntityId(1), EntityId(2)]);
        assert_eq!(loader.mark(&tag, &[EntityId(2), EntityId(3)]), vec![EntityId(3)]);
        assert!(loader.is_visited(&tag, EntityId(3)));
        assert_eq!(loader.visited_count(), 3);
    }
}
