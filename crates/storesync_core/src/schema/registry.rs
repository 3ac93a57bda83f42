//! Registration-time mapping from type tags to schemas.

use super::TypeSchema;
use crate::error::{CoreError, CoreResult};
use crate::types::TypeTag;
use std::collections::{BTreeMap, HashMap};

/// Registry of every type the engine may touch.
///
/// Lookups accept either the type tag or the client alias a schema was
/// registered with. Unknown names fail fast with [`CoreError::UnknownType`].
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<TypeTag, TypeSchema>,
    aliases: HashMap<String, TypeTag>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema.
    pub fn register(&mut self, schema: TypeSchema) -> CoreResult<()> {
        schema.check()?;

        let tag = schema.tag().clone();
        if self.types.contains_key(&tag) {
            return Err(CoreError::DuplicateType {
                name: tag.to_string(),
            });
        }
        if let Some(alias) = schema.client_type() {
            if let Some(existing) = self.aliases.get(alias) {
                return Err(CoreError::invalid_schema(
                    tag.as_str(),
                    format!("client type {alias} already maps to {existing}"),
                ));
            }
            self.aliases.insert(alias.to_string(), tag.clone());
        }

        tracing::debug!(type_tag = %tag, relations = schema.relations().len(), "registered type");
        self.types.insert(tag, schema);
        Ok(())
    }

    /// Registers a schema, builder style.
    pub fn with(mut self, schema: TypeSchema) -> CoreResult<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Returns the schema for a tag.
    pub fn get(&self, tag: &TypeTag) -> CoreResult<&TypeSchema> {
        self.types
            .get(tag)
            .ok_or_else(|| CoreError::unknown_type(tag.as_str()))
    }

    /// Resolves a tag or client alias.
    pub fn resolve(&self, name: &str) -> CoreResult<&TypeSchema> {
        if let Some(schema) = self.types.get(name) {
            return Ok(schema);
        }
        self.aliases
            .get(name)
            .and_then(|tag| self.types.get(tag))
            .ok_or_else(|| CoreError::unknown_type(name))
    }

    /// Returns true if a tag is registered.
    #[must_use]
    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.types.contains_key(tag)
    }

    /// Iterates over registered schemas in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeSchema> {
        self.types.values()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Checks that every relation targets a registered type.
    ///
    /// Call once after all types are registered.
    pub fn validate(&self) -> CoreResult<()> {
        for schema in self.types.values() {
            for relation in schema.relations() {
                if !self.types.contains_key(&relation.target) {
                    return Err(CoreError::invalid_schema(
                        schema.tag().as_str(),
                        format!(
                            "relation {} targets unknown type {}",
                            relation.name, relation.target
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Finds cycles in the eager relation graph.
    ///
    /// Each cycle is reported once as the list of types along it, starting
    /// from its smallest tag. Self-referential eager relations are cycles of
    /// length one.
    #[must_use]
    pub fn eager_cycles(&self) -> Vec<Vec<TypeTag>> {
        let mut cycles: Vec<Vec<TypeTag>> = Vec::new();
        for start in self.types.keys() {
            let mut path = vec![start.clone()];
            self.walk_eager(start, &mut path, &mut cycles);
        }
        cycles
    }

    fn walk_eager(&self, start: &TypeTag, path: &mut Vec<TypeTag>, cycles: &mut Vec<Vec<TypeTag>>) {
        let Some(current) = path.last().and_then(|tag| self.types.get(tag)) else {
            return;
        };
        let mut targets: Vec<&TypeTag> = current
            .eager_relations()
            .iter()
            .filter_map(|name| current.relation(name).ok())
            .map(|relation| &relation.target)
            .collect();
        targets.sort();
        targets.dedup();

        for target in targets {
            if target == start {
                if !cycles.contains(path) {
                    cycles.push(path.clone());
                }
            } else if target > start && !path.contains(target) {
                // Only walk through tags above the start so each cycle is
                // found from its smallest member.
                path.push(target.clone());
                self.walk_eager(start, path, cycles);
                path.pop();
            }
        }
    }
}
