//! Type schemas: relations, eager declarations and capability interfaces.

mod capability;
mod declaration;
mod registry;
mod relation;

pub use capability::{
    compare_values, AllowAll, AttributeMatch, CapabilityScope, FieldErrors, NoValidation,
    OwnerScope, RequiredAttributes, SearchProvider, Validator,
};
pub use declaration::{ScopeDeclaration, TypeDeclaration};
pub use registry::SchemaRegistry;
pub use relation::{Cardinality, JoinSide, RelationKind, RelationMeta};

use crate::entity::Attributes;
use crate::error::{CoreError, CoreResult};
use crate::types::TypeTag;
use std::fmt;
use std::sync::Arc;

/// Everything the engine knows about one declared type.
///
/// Built with the `with_*` methods and handed to
/// [`SchemaRegistry::register`]. Capability interfaces that are not set
/// explicitly default to [`AllowAll`], [`NoValidation`] and
/// [`AttributeMatch`].
#[derive(Clone)]
pub struct TypeSchema {
    tag: TypeTag,
    table: String,
    client_type: Option<String>,
    relations: Vec<RelationMeta>,
    eager: Vec<String>,
    defaults: Attributes,
    scope: Arc<dyn CapabilityScope>,
    validator: Arc<dyn Validator>,
    search: Arc<dyn SearchProvider>,
}

impl TypeSchema {
    /// Creates a schema whose table is the lowercase tag.
    pub fn new(tag: impl Into<TypeTag>) -> Self {
        let tag = tag.into();
        let table = tag.as_str().to_lowercase();
        Self {
            tag,
            table,
            client_type: None,
            relations: Vec::new(),
            eager: Vec::new(),
            defaults: Attributes::new(),
            scope: Arc::new(AllowAll),
            validator: Arc::new(NoValidation),
            search: Arc::new(AttributeMatch),
        }
    }

    /// Sets the storage table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the client-side type name this type is also known by.
    #[must_use]
    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = Some(client_type.into());
        self
    }

    /// Declares a relation.
    #[must_use]
    pub fn with_relation(mut self, relation: RelationMeta) -> Self {
        self.relations.push(relation);
        self
    }

    /// Declares relations that are always delivered with this type.
    #[must_use]
    pub fn with_eager<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eager.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets attributes every new instance starts with.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Attributes) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the capability scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl CapabilityScope + 'static) -> Self {
        self.scope = Arc::new(scope);
        self
    }

    /// Sets the validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Sets the search provider.
    #[must_use]
    pub fn with_search(mut self, search: impl SearchProvider + 'static) -> Self {
        self.search = Arc::new(search);
        self
    }

    /// Returns the type tag.
    #[must_use]
    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// Returns the storage table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the client alias, if any.
    #[must_use]
    pub fn client_type(&self) -> Option<&str> {
        self.client_type.as_deref()
    }

    /// Returns all declared relations.
    #[must_use]
    pub fn relations(&self) -> &[RelationMeta] {
        &self.relations
    }

    /// Looks up a relation by name.
    pub fn relation(&self, name: &str) -> CoreResult<&RelationMeta> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CoreError::unknown_relation(self.tag.as_str(), name))
    }

    /// Returns the eager relation names in declaration order.
    #[must_use]
    pub fn eager_relations(&self) -> &[String] {
        &self.eager
    }

    /// Returns the attributes a new instance starts with.
    #[must_use]
    pub fn defaults(&self) -> &Attributes {
        &self.defaults
    }

    /// Returns the capability scope.
    #[must_use]
    pub fn scope(&self) -> &dyn CapabilityScope {
        self.scope.as_ref()
    }

    /// Returns the validator.
    #[must_use]
    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    /// Returns the search provider.
    #[must_use]
    pub fn search(&self) -> &dyn SearchProvider {
        self.search.as_ref()
    }

    /// Checks that relation names are unique and eager names are declared.
    pub(crate) fn check(&self) -> CoreResult<()> {
        for (i, relation) in self.relations.iter().enumerate() {
            if self.relations[..i].iter().any(|r| r.name == relation.name) {
                return Err(CoreError::invalid_schema(
                    self.tag.as_str(),
                    format!("relation {} declared twice", relation.name),
                ));
            }
        }
        for name in &self.eager {
            self.relation(name).map_err(|_| {
                CoreError::invalid_schema(
                    self.tag.as_str(),
                    format!("eager relation {name} is not declared"),
                )
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSchema")
            .field("tag", &self.tag)
            .field("table", &self.table)
            .field("client_type", &self.client_type)
            .field("relations", &self.relations)
            .field("eager", &self.eager)
            .finish_non_exhaustive()
    }
}
