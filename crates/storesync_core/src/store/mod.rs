//! Persistent store interface and the in-memory reference store.
//!
//! The engine only talks to a store through [`EntityStore`] and
//! [`StoreTransaction`]. Every request runs inside exactly one write
//! transaction: [`EntityStore::transaction`] commits when the closure
//! returns `Ok` and rolls back when it returns `Err`.

mod memory;
mod snapshot;
mod state;

pub use memory::{MemoryStore, MemoryTransaction};
pub use snapshot::StoreSnapshot;
pub use state::{PendingWrite, TransactionId, TransactionState};

use crate::entity::{Attributes, Entity};
use crate::error::{CoreError, CoreResult};
use crate::schema::{JoinSide, RelationMeta, TypeSchema};
use crate::types::{EntityId, TypeTag};

/// A store that hands out write transactions.
pub trait EntityStore: Send + Sync {
    /// Begins a write transaction.
    fn begin_write(&self) -> CoreResult<Box<dyn StoreTransaction + '_>>;

    /// Runs `f` inside a write transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back if it returns `Err`.
    fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<CoreError>,
    {
        let mut txn = self.begin_write()?;
        match f(txn.as_mut()) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Operations available inside a write transaction.
///
/// Reads observe the transaction's own uncommitted writes.
pub trait StoreTransaction {
    /// Fetches an entity.
    fn get(&self, type_tag: &TypeTag, id: EntityId) -> CoreResult<Option<Entity>>;

    /// Lists all entities of a type in ascending id order.
    fn list(&self, type_tag: &TypeTag) -> CoreResult<Vec<Entity>>;

    /// Inserts a new entity and returns its allocated id.
    fn insert(&mut self, type_tag: &TypeTag, attributes: Attributes) -> CoreResult<EntityId>;

    /// Replaces the attributes of an existing entity.
    fn update(&mut self, entity: &Entity) -> CoreResult<()>;

    /// Deletes an entity. Returns false if it did not exist.
    fn delete(&mut self, type_tag: &TypeTag, id: EntityId) -> CoreResult<bool>;

    /// Runs a relation join and returns (origin id, related id) rows, grouped
    /// by ascending origin id and ordered within each origin.
    fn join(&self, query: &JoinQuery) -> CoreResult<Vec<JoinRow>>;

    /// Returns the ids linked to `origin` in a join table, in link order.
    fn links(&self, join_table: &str, side: JoinSide, origin: EntityId) -> CoreResult<Vec<EntityId>>;

    /// Replaces the ids linked to `origin` in a join table.
    fn set_links(
        &mut self,
        join_table: &str,
        side: JoinSide,
        origin: EntityId,
        related: &[EntityId],
    ) -> CoreResult<()>;

    /// Makes all writes durable and visible.
    fn commit(self: Box<Self>) -> CoreResult<()>;

    /// Discards all writes.
    fn rollback(self: Box<Self>) -> CoreResult<()>;
}

/// A join between an origin type and one of its relations.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinQuery {
    /// Origin type.
    pub origin_type: TypeTag,
    /// Origin table name.
    pub origin_table: String,
    /// Related type.
    pub related_type: TypeTag,
    /// Alias under which the related table is joined.
    pub related_alias: String,
    /// The relation being joined.
    pub relation: RelationMeta,
    /// Origin ids the join is restricted to.
    pub origin_ids: Vec<EntityId>,
}

impl JoinQuery {
    /// Builds a join from `origin` across `relation` into `related`.
    ///
    /// When both sides live in the same table the related side is aliased
    /// `<relation>_<table>`.
    #[must_use]
    pub fn new(
        origin: &TypeSchema,
        relation: &RelationMeta,
        related: &TypeSchema,
        origin_ids: Vec<EntityId>,
    ) -> Self {
        let related_alias = if origin.table() == related.table() {
            format!("{}_{}", relation.name, related.table())
        } else {
            related.table().to_string()
        };
        Self {
            origin_type: origin.tag().clone(),
            origin_table: origin.table().to_string(),
            related_type: related.tag().clone(),
            related_alias,
            relation: relation.clone(),
            origin_ids,
        }
    }

    /// Fails if the two sides of the join share an alias.
    pub fn check_aliases(&self) -> CoreResult<()> {
        if self.origin_table == self.related_alias {
            return Err(CoreError::AmbiguousJoin {
                alias: self.related_alias.clone(),
            });
        }
        Ok(())
    }

    /// Renders the query for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "SELECT {origin}.id AS id, {alias}.id AS relation_id FROM {origin} JOIN {alias} VIA {relation} WHERE {origin}.id IN ({count} ids)",
            origin = self.origin_table,
            alias = self.related_alias,
            relation = self.relation.name,
            count = self.origin_ids.len(),
        )
    }
}

/// One row of a relation join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinRow {
    /// The origin id.
    pub origin: EntityId,
    /// The related id.
    pub related: EntityId,
}

impl JoinRow {
    /// Creates a row.
    #[must_use]
    pub const fn new(origin: EntityId, related: EntityId) -> Self {
        Self { origin, related }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_join_is_aliased() {
        let category = TypeSchema::new("Category").with_table("categories");
        let children = RelationMeta::has_many("children", "Category", "parent_id");
        let query = JoinQuery::new(&category, &children, &category, vec![EntityId(1)]);
        assert_eq!(query.related_alias, "children_categories");
        assert!(query.check_aliases().is_ok());
        assert!(query.describe().contains("children_categories.id AS relation_id"));
    }

    #[test]
    fn distinct_tables_keep_names() {
        let book = TypeSchema::new("Book").with_table("books");
        let author = TypeSchema::new("Author").with_table("authors");
        let relation = RelationMeta::belongs_to("author", "Author", "author_id");
        let query = JoinQuery::new(&book, &relation, &author, vec![]);
        assert_eq!(query.related_alias, "authors");
    }

    #[test]
    fn colliding_alias_rejected() {
        let category = TypeSchema::new("Category").with_table("categories");
        let children = RelationMeta::has_many("children", "Category", "parent_id");
        let mut query = JoinQuery::new(&category, &children, &category, vec![]);
        query.related_alias = "categories".into();
        assert!(matches!(
            query.check_aliases(),
            Err(CoreError::AmbiguousJoin { .. })
        ));
    }
}
