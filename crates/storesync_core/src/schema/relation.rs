//! Relation metadata.

use crate::types::TypeTag;
use serde::{Deserialize, Serialize};

/// Number of entities on the far side of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one related entity.
    One,
    /// Any number of related entities.
    Many,
}

/// Which column of a join table holds the origin id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinSide {
    /// Origin ids live in the first column.
    Left,
    /// Origin ids live in the second column.
    Right,
}

impl JoinSide {
    /// The column holding the related ids.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// How a relation is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RelationKind {
    /// The origin carries the related id in `foreign_key`.
    #[serde(rename_all = "camelCase")]
    BelongsTo {
        /// Attribute on the origin.
        foreign_key: String,
    },
    /// The related entity carries the origin id in `foreign_key`; one match.
    #[serde(rename_all = "camelCase")]
    HasOne {
        /// Attribute on the related entity.
        foreign_key: String,
    },
    /// The related entities carry the origin id in `foreign_key`.
    #[serde(rename_all = "camelCase")]
    HasMany {
        /// Attribute on the related entities.
        foreign_key: String,
    },
    /// Pairs of ids in a join table.
    #[serde(rename_all = "camelCase")]
    ManyToMany {
        /// Join table name.
        join_table: String,
        /// Column holding the origin id.
        side: JoinSide,
    },
}

/// A declared relation of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMeta {
    /// Relation name (snake case).
    pub name: String,
    /// Type on the far side.
    pub target: TypeTag,
    /// Storage of the relation.
    #[serde(flatten)]
    pub kind: RelationKind,
    /// Attribute of the related entities to order by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

impl RelationMeta {
    /// Declares a belongs-to relation.
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<TypeTag>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            target,
            RelationKind::BelongsTo {
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Declares a has-one relation.
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<TypeTag>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            target,
            RelationKind::HasOne {
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Declares a has-many relation.
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<TypeTag>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            target,
            RelationKind::HasMany {
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Declares a many-to-many relation through a join table.
    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<TypeTag>,
        join_table: impl Into<String>,
        side: JoinSide,
    ) -> Self {
        Self::with_kind(
            name,
            target,
            RelationKind::ManyToMany {
                join_table: join_table.into(),
                side,
            },
        )
    }

    fn with_kind(name: impl Into<String>, target: impl Into<TypeTag>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            order: None,
        }
    }

    /// Orders related entities by an attribute.
    #[must_use]
    pub fn ordered_by(mut self, attribute: impl Into<String>) -> Self {
        self.order = Some(attribute.into());
        self
    }

    /// Returns the relation's cardinality.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. } => Cardinality::One,
            RelationKind::HasMany { .. } | RelationKind::ManyToMany { .. } => Cardinality::Many,
        }
    }

    /// Returns true when the linkage is not visible as an attribute of the
    /// returned entities, so clients need a relation index to rebuild it.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::ManyToMany { .. } | RelationKind::HasOne { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cardinality_and_index() {
        let author = RelationMeta::belongs_to("author", "Author", "author_id");
        assert_eq!(author.cardinality(), Cardinality::One);
        assert!(!author.is_indexed());

        let tags = RelationMeta::many_to_many("tags", "Tag", "books_tags", JoinSide::Left);
        assert_eq!(tags.cardinality(), Cardinality::Many);
        assert!(tags.is_indexed());

        let cover = RelationMeta::has_one("cover", "Cover", "book_id");
        assert_eq!(cover.cardinality(), Cardinality::One);
        assert!(cover.is_indexed());
    }

    #[test]
    fn declaration_json() {
        let meta: RelationMeta = serde_json::from_value(json!({
            "name": "tags",
            "target": "Tag",
            "kind": "manyToMany",
            "joinTable": "books_tags",
            "side": "left"
        }))
        .unwrap();
        assert_eq!(
            meta,
            RelationMeta::many_to_many("tags", "Tag", "books_tags", JoinSide::Left)
        );
    }
}
