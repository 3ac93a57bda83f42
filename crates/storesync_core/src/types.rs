//! Core type definitions for StoreSync.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Identifier of a persisted entity.
///
/// Identifiers are allocated by the store per type, start at 1 and are
/// never reused within a committed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Creates an entity ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reads an entity ID from a JSON value.
    ///
    /// Accepts non-negative integers and strings holding one.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::from(id.0)
    }
}

/// Client-assigned temporary identifier ("cid") of an entity that has not
/// been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    /// Creates a temp id.
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    /// Returns the raw client identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TempId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Reference to an entity that is either persisted or only known to the
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// A stored entity.
    Persisted(EntityId),
    /// An entity that only has a client temp id.
    Pending(TempId),
}

impl EntityRef {
    /// Decodes a reference from a JSON value.
    ///
    /// Numbers and numeric strings are persisted ids. Any other non-empty
    /// string is a temp id. Everything else is not a reference.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(id) = EntityId::from_value(value) {
            return Some(Self::Persisted(id));
        }
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::Pending(TempId::new(s.clone()))),
            _ => None,
        }
    }

    /// Returns the persisted id, if any.
    #[must_use]
    pub fn persisted(&self) -> Option<EntityId> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }

    /// Returns the temp id, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&TempId> {
        match self {
            Self::Persisted(_) => None,
            Self::Pending(cid) => Some(cid),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "#{id}"),
            Self::Pending(cid) => write!(f, "cid:{cid}"),
        }
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        Self::Persisted(id)
    }
}

impl From<TempId> for EntityRef {
    fn from(cid: TempId) -> Self {
        Self::Pending(cid)
    }
}

/// Declared server-side type of an entity (the "railsClass" on the wire).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    /// Creates a type tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TypeTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// The identity under which capability-scoped access is evaluated.
///
/// An actor is fixed for the lifetime of a request and passed explicitly to
/// every scoped read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Actor {
    user_id: Option<EntityId>,
}

impl Actor {
    /// An authenticated actor.
    #[must_use]
    pub const fn user(id: EntityId) -> Self {
        Self { user_id: Some(id) }
    }

    /// An unauthenticated actor.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// Returns the user id, if authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<EntityId> {
        self.user_id
    }

    /// Returns true for the anonymous actor.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user_id {
            Some(id) => write!(f, "user:{id}"),
            None => f.write_str("anonymous"),
        }
    }
}

/// Operation a capability scope is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// View an entity or its relations.
    Read,
    /// Create or modify an entity or its relations.
    Write,
    /// Delete an entity.
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Remove => f.write_str("remove"),
        }
    }
}
