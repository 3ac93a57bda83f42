//! Library fixture and seeding helpers.
//!
//! The library schema exercises every relation kind the engine handles:
//! - `Author` ↔ `Book` is an eager cycle (has-many one way, belongs-to back)
//! - `Book` ↔ `Tag` is many-to-many through `books_tags`
//! - `Category` is self-referential in both directions
//! - `Note` is owner scoped and private

use serde_json::{json, Value};
use storesync_core::{
    Attributes, CoreError, EntityId, EntityStore, JoinSide, MemoryStore, SchemaRegistry,
    StoreTransaction, TypeDeclaration, TypeTag,
};

/// Join table linking books and tags.
pub const BOOKS_TAGS: &str = "books_tags";

/// Builds an attribute map from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Type declarations of the library schema.
pub fn library_declarations() -> Vec<TypeDeclaration> {
    serde_json::from_value(json!([
        {
            "tag": "Author",
            "table": "authors",
            "clientType": "author",
            "relations": [
                {"name": "books", "target": "Book", "kind": "hasMany", "foreignKey": "author_id",
                 "order": "title"}
            ],
            "eager": ["books"],
            "required": ["name"]
        },
        {
            "tag": "Book",
            "table": "books",
            "clientType": "book",
            "relations": [
                {"name": "author", "target": "Author", "kind": "belongsTo", "foreignKey": "author_id"},
                {"name": "tags", "target": "Tag", "kind": "manyToMany", "joinTable": BOOKS_TAGS,
                 "side": "left"}
            ],
            "eager": ["author", "tags"],
            "required": ["title"],
            "defaults": {"available": true}
        },
        {
            "tag": "Tag",
            "table": "tags",
            "clientType": "tag",
            "relations": [
                {"name": "books", "target": "Book", "kind": "manyToMany", "joinTable": BOOKS_TAGS,
                 "side": "right"}
            ]
        },
        {
            "tag": "Category",
            "table": "categories",
            "clientType": "category",
            "relations": [
                {"name": "parent", "target": "Category", "kind": "belongsTo", "foreignKey": "parent_id"},
                {"name": "children", "target": "Category", "kind": "hasMany", "foreignKey": "parent_id"}
            ],
            "eager": ["parent", "children"]
        },
        {
            "tag": "Note",
            "table": "notes",
            "clientType": "note",
            "required": ["body"],
            "scope": {"policy": "owner", "attribute": "owner_id", "private": true}
        }
    ]))
    .expect("library declarations are valid")
}

/// Registry built from [`library_declarations`].
pub fn library_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for declaration in library_declarations() {
        registry
            .register(declaration.into_schema())
            .expect("library type registers");
    }
    registry.validate().expect("library registry is consistent");
    registry
}

/// Ids of the seeded library rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySeed {
    /// Le Guin, Herbert.
    pub authors: Vec<EntityId>,
    /// Earthsea and The Dispossessed by Le Guin, Dune by Herbert.
    pub books: Vec<EntityId>,
    /// "fantasy", "sf".
    pub tags: Vec<EntityId>,
    /// Fiction ← Science fiction ← Space opera.
    pub categories: Vec<EntityId>,
    /// One note owned by user 1, one by user 2.
    pub notes: Vec<EntityId>,
}

/// Seeds the library rows into `txn`.
pub fn seed_library(txn: &mut dyn StoreTransaction) -> Result<LibrarySeed, CoreError> {
    let author = TypeTag::new("Author");
    let book = TypeTag::new("Book");
    let tag = TypeTag::new("Tag");
    let category = TypeTag::new("Category");
    let note = TypeTag::new("Note");

    let le_guin = txn.insert(&author, attrs(json!({"name": "Ursula K. Le Guin"})))?;
    let herbert = txn.insert(&author, attrs(json!({"name": "Frank Herbert"})))?;

    let earthsea = txn.insert(
        &book,
        attrs(json!({"title": "A Wizard of Earthsea", "author_id": le_guin})),
    )?;
    let dispossessed = txn.insert(
        &book,
        attrs(json!({"title": "The Dispossessed", "author_id": le_guin})),
    )?;
    let dune = txn.insert(&book, attrs(json!({"title": "Dune", "author_id": herbert})))?;

    let fantasy = txn.insert(&tag, attrs(json!({"name": "fantasy"})))?;
    let sf = txn.insert(&tag, attrs(json!({"name": "sf"})))?;
    txn.set_links(BOOKS_TAGS, JoinSide::Left, earthsea, &[fantasy])?;
    txn.set_links(BOOKS_TAGS, JoinSide::Left, dispossessed, &[sf])?;
    txn.set_links(BOOKS_TAGS, JoinSide::Left, dune, &[sf])?;

    let fiction = txn.insert(&category, attrs(json!({"name": "Fiction", "parent_id": null})))?;
    let science = txn.insert(
        &category,
        attrs(json!({"name": "Science fiction", "parent_id": fiction})),
    )?;
    let space = txn.insert(
        &category,
        attrs(json!({"name": "Space opera", "parent_id": science})),
    )?;

    let first = txn.insert(&note, attrs(json!({"body": "reread", "owner_id": 1})))?;
    let second = txn.insert(&note, attrs(json!({"body": "lend", "owner_id": 2})))?;

    Ok(LibrarySeed {
        authors: vec![le_guin, herbert],
        books: vec![earthsea, dispossessed, dune],
        tags: vec![fantasy, sf],
        categories: vec![fiction, science, space],
        notes: vec![first, second],
    })
}

/// Creates a store holding the seeded library.
pub fn library_store() -> (MemoryStore, LibrarySeed) {
    let store = MemoryStore::new();
    let seed = store
        .transaction(|txn| seed_library(txn))
        .expect("library seeds");
    (store, seed)
}

/// Inserts `count` untagged books titled `Book 001`, `Book 002`, ...
pub fn seed_books(store: &MemoryStore, count: usize) -> Vec<EntityId> {
    let book = TypeTag::new("Book");
    store
        .transaction(|txn| {
            (1..=count)
                .map(|i| txn.insert(&book, attrs(json!({"title": format!("Book {i:03}")}))))
                .collect::<Result<Vec<_>, CoreError>>()
        })
        .expect("books seed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_eager_cycles() {
        let registry = library_registry();
        assert_eq!(registry.len(), 5);
        let cycles = registry.eager_cycles();
        assert!(cycles.contains(&vec![TypeTag::new("Author"), TypeTag::new("Book")]));
        assert!(cycles.contains(&vec![TypeTag::new("Category")]));
    }

    #[test]
    fn library_seeds() {
        let (store, seed) = library_store();
        assert_eq!(seed.books, vec![EntityId(1), EntityId(2), EntityId(3)]);
        assert_eq!(store.count(&TypeTag::new("Book")), 3);
        assert_eq!(store.join_table(BOOKS_TAGS).len(), 3);
    }

    #[test]
    fn seeded_books_follow_library() {
        let (store, _) = library_store();
        let ids = seed_books(&store, 2);
        assert_eq!(ids, vec![EntityId(4), EntityId(5)]);
    }
}
