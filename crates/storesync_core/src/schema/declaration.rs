//! Serializable type declarations.
//!
//! Declarations describe a schema as data, for fixtures and tooling. They can
//! only choose among the built-in capability policies; custom policies are
//! attached in code through [`TypeSchema`].

use super::{OwnerScope, RelationMeta, RequiredAttributes, TypeSchema};
use crate::entity::Attributes;
use serde::{Deserialize, Serialize};

/// Built-in scope choices for declared types.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum ScopeDeclaration {
    /// Everyone may do everything.
    #[default]
    AllowAll,
    /// Owner-keyed access; see [`OwnerScope`].
    #[serde(rename_all = "camelCase")]
    Owner {
        /// Attribute holding the owner's user id.
        attribute: String,
        /// Whether reads are restricted to the owner as well.
        #[serde(default)]
        private: bool,
    },
}

/// A type schema described as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDeclaration {
    /// Type tag.
    pub tag: String,
    /// Storage table; defaults to the lowercase tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Client alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_type: Option<String>,
    /// Declared relations.
    #[serde(default)]
    pub relations: Vec<RelationMeta>,
    /// Eager relation names.
    #[serde(default)]
    pub eager: Vec<String>,
    /// Attributes that must be present and non-blank.
    #[serde(default)]
    pub required: Vec<String>,
    /// Attributes every new instance starts with.
    #[serde(default)]
    pub defaults: Attributes,
    /// Capability scope policy.
    #[serde(default)]
    pub scope: ScopeDeclaration,
}

impl TypeDeclaration {
    /// Builds the schema this declaration describes.
    #[must_use]
    pub fn into_schema(self) -> TypeSchema {
        let mut schema = TypeSchema::new(self.tag.as_str())
            .with_eager(self.eager)
            .with_defaults(self.defaults);
        if let Some(table) = self.table {
            schema = schema.with_table(table);
        }
        if let Some(client_type) = self.client_type {
            schema = schema.with_client_type(client_type);
        }
        for relation in self.relations {
            schema = schema.with_relation(relation);
        }
        if !self.required.is_empty() {
            schema = schema.with_validator(RequiredAttributes::new(self.required));
        }
        match self.scope {
            ScopeDeclaration::AllowAll => schema,
            ScopeDeclaration::Owner { attribute, private } => {
                let scope = OwnerScope::new(attribute);
                schema.with_scope(if private { scope.private() } else { scope })
            }
        }
    }
}
