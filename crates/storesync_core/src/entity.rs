//! Entities as stored and returned.

use crate::types::{EntityId, TypeTag};
use serde::Serialize;
use serde_json::{Map, Value};

/// Attribute map of an entity.
pub type Attributes = Map<String, Value>;

/// Attribute names the engine manages itself and never writes through.
pub const RESERVED_ATTRIBUTES: [&str; 2] = ["id", "cid"];

/// A persisted entity.
///
/// Serializes as a flat JSON object: the attributes plus `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    #[serde(skip)]
    type_tag: TypeTag,
    id: EntityId,
    #[serde(flatten)]
    attributes: Attributes,
}

impl Entity {
    /// Creates an entity. Reserved keys are stripped from the attributes.
    pub fn new(type_tag: TypeTag, id: EntityId, mut attributes: Attributes) -> Self {
        for key in RESERVED_ATTRIBUTES {
            attributes.remove(key);
        }
        Self {
            type_tag,
            id,
            attributes,
        }
    }

    /// Returns the entity's type.
    #[must_use]
    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// Returns the entity's id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns one attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Reads an attribute as an entity id (foreign key).
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<EntityId> {
        self.attributes.get(name).and_then(EntityId::from_value)
    }

    /// Sets an attribute. Reserved keys are ignored.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if !RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            self.attributes.insert(name, value);
        }
    }

    /// Applies every non-reserved attribute from `changes`.
    pub fn apply(&mut self, changes: &Attributes) {
        for (name, value) in changes {
            self.set(name.clone(), value.clone());
        }
    }

    /// Consumes the entity, returning its attributes.
    #[must_use]
    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }

    /// Renders the entity as a JSON object including `id`.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        let mut object = self.attributes.clone();
        object.insert("id".into(), self.id.into());
        object
    }
}
