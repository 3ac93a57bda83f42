//! Per-type capability interfaces: access scoping, validation and search.
//!
//! Each registered type carries one implementation of every interface. Types
//! that do not provide their own get the explicit defaults [`AllowAll`],
//! [`NoValidation`] and [`AttributeMatch`] at registration time.

use crate::entity::{Attributes, Entity};
use crate::types::{Actor, EntityId, Operation, TypeTag};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field name → error messages. Empty means valid.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Restricts what an actor may read, write or remove.
pub trait CapabilityScope: Send + Sync {
    /// Returns true if `actor` may perform `operation` on `entity`.
    fn permits(&self, actor: &Actor, operation: Operation, entity: &Entity) -> bool;
}

impl<F> CapabilityScope for F
where
    F: Fn(&Actor, Operation, &Entity) -> bool + Send + Sync,
{
    fn permits(&self, actor: &Actor, operation: Operation, entity: &Entity) -> bool {
        self(actor, operation, entity)
    }
}

/// Scope that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityScope for AllowAll {
    fn permits(&self, _actor: &Actor, _operation: Operation, _entity: &Entity) -> bool {
        true
    }
}

/// Scope keyed on an owner attribute.
///
/// Writes and removals require the entity's owner attribute to equal the
/// actor's user id. Reads are open unless `private` is set.
#[derive(Debug, Clone)]
pub struct OwnerScope {
    attribute: String,
    private: bool,
}

impl OwnerScope {
    /// Creates an owner scope reading the owner id from `attribute`.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            private: false,
        }
    }

    /// Restricts reads to the owner too.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    fn is_owner(&self, actor: &Actor, entity: &Entity) -> bool {
        match (actor.user_id(), entity.reference(&self.attribute)) {
            (Some(user), Some(owner)) => user == owner,
            _ => false,
        }
    }
}

impl CapabilityScope for OwnerScope {
    fn permits(&self, actor: &Actor, operation: Operation, entity: &Entity) -> bool {
        match operation {
            Operation::Read if !self.private => true,
            _ => self.is_owner(actor, entity),
        }
    }
}

/// Validates attributes before they are persisted.
pub trait Validator: Send + Sync {
    /// Returns field errors; empty when the attributes are valid.
    fn validate(&self, type_tag: &TypeTag, attributes: &Attributes) -> FieldErrors;
}

impl<F> Validator for F
where
    F: Fn(&TypeTag, &Attributes) -> FieldErrors + Send + Sync,
{
    fn validate(&self, type_tag: &TypeTag, attributes: &Attributes) -> FieldErrors {
        self(type_tag, attributes)
    }
}

/// Validator that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl Validator for NoValidation {
    fn validate(&self, _type_tag: &TypeTag, _attributes: &Attributes) -> FieldErrors {
        FieldErrors::new()
    }
}

/// Requires attributes to be present, non-null and not blank.
#[derive(Debug, Clone, Default)]
pub struct RequiredAttributes {
    names: Vec<String>,
}

impl RequiredAttributes {
    /// Creates a validator requiring `names`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for RequiredAttributes {
    fn validate(&self, _type_tag: &TypeTag, attributes: &Attributes) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for name in &self.names {
            let blank = match attributes.get(name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if blank {
                errors
                    .entry(name.clone())
                    .or_default()
                    .push("can't be blank".into());
            }
        }
        errors
    }
}

/// Runs a search over the entities an actor may read.
pub trait SearchProvider: Send + Sync {
    /// Filters and orders `candidates` (given in ascending id order).
    fn search(&self, candidates: Vec<Entity>, params: &Value) -> Vec<Entity>;
}

/// Default search: every key of `params` must equal the entity's attribute,
/// except `order`, which names an attribute to sort by (prefix `-` for
/// descending). Non-object params match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMatch;

impl AttributeMatch {
    fn matches(entity: &Entity, filters: &serde_json::Map<String, Value>) -> bool {
        filters
            .iter()
            .filter(|(key, _)| key.as_str() != "order")
            .all(|(key, expected)| match key.as_str() {
                "id" => EntityId::from_value(expected) == Some(entity.id()),
                _ => entity.get(key) == Some(expected),
            })
    }
}

impl SearchProvider for AttributeMatch {
    fn search(&self, candidates: Vec<Entity>, params: &Value) -> Vec<Entity> {
        let Some(filters) = params.as_object() else {
            return candidates;
        };

        let mut results: Vec<Entity> = candidates
            .into_iter()
            .filter(|entity| Self::matches(entity, filters))
            .collect();

        if let Some(order) = filters.get("order").and_then(Value::as_str) {
            let (attribute, descending) = match order.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (order, false),
            };
            results.sort_by(|a, b| {
                let ordering = compare_values(a.get(attribute), b.get(attribute));
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        results
    }
}

impl<F> SearchProvider for F
where
    F: Fn(Vec<Entity>, &Value) -> Vec<Entity> + Send + Sync,
{
    fn search(&self, candidates: Vec<Entity>, params: &Value) -> Vec<Entity> {
        self(candidates, params)
    }
}

/// Total order over optional JSON values: missing and null first, then
/// booleans, numbers, strings; anything else compares equal.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: u64, value: Value) -> Entity {
        Entity::new(
            TypeTag::new("Note"),
            EntityId(id),
            value.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn owner_scope() {
        let scope = OwnerScope::new("owner_id");
        let note = entity(1, json!({"owner_id": 7}));
        let owner = Actor::user(EntityId(7));
        let other = Actor::user(EntityId(8));

        assert!(scope.permits(&other, Operation::Read, &note));
        assert!(scope.permits(&owner, Operation::Write, &note));
        assert!(!scope.permits(&other, Operation::Write, &note));
        assert!(!scope.permits(&Actor::anonymous(), Operation::Remove, &note));

        let private = OwnerScope::new("owner_id").private();
        assert!(!private.permits(&other, Operation::Read, &note));
        assert!(private.permits(&owner, Operation::Read, &note));
    }

    #[test]
    fn closure_scope() {
        let read_only = |_: &Actor, op: Operation, _: &Entity| op == Operation::Read;
        let note = entity(1, json!({}));
        assert!(read_only.permits(&Actor::anonymous(), Operation::Read, &note));
        assert!(!read_only.permits(&Actor::anonymous(), Operation::Write, &note));
    }

    #[test]
    fn required_attributes() {
        let validator = RequiredAttributes::new(["title", "isbn"]);
        let attrs = json!({"title": "  ", "isbn": "123"});
        let errors = validator.validate(&TypeTag::new("Book"), attrs.as_object().unwrap());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["title"], vec!["can't be blank".to_string()]);
    }

    #[test]
    fn attribute_match_filters_and_orders() {
        let candidates = vec![
            entity(1, json!({"genre": "sf", "year": 1965})),
            entity(2, json!({"genre": "drama", "year": 1815})),
            entity(3, json!({"genre": "sf", "year": 1951})),
        ];
        let results = AttributeMatch.search(candidates, &json!({"genre": "sf", "order": "-year"}));
        let ids: Vec<_> = results.iter().map(Entity::id).collect();
        assert_eq!(ids, vec![EntityId(1), EntityId(3)]);
    }

    #[test]
    fn attribute_match_without_object_params() {
        let candidates = vec![entity(1, json!({})), entity(2, json!({}))];
        assert_eq!(AttributeMatch.search(candidates, &Value::Null).len(), 2);
    }

    #[test]
    fn compare_values_ranks_types() {
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
    }
}
