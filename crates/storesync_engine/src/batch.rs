//! Typed decoding of a [`SyncRequest`] into commands.
//!
//! Decoding resolves every type name against the registry and every relation
//! name against its type, so later stages never see an unknown name.

use crate::error::{SyncError, SyncResult};
use serde_json::Value;
use std::collections::BTreeSet;
use storesync_core::{
    Attributes, EntityId, EntityRef, RelationMeta, SchemaRegistry, TypeSchema, TypeTag,
    RESERVED_ATTRIBUTES,
};
use storesync_protocol::{RelationChanges, SyncRequest};

/// A decoded request. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    /// Creates and updates, in request order.
    pub upserts: Vec<Upsert>,
    /// Deletions.
    pub deletions: Vec<Deletion>,
    /// Relation additions.
    pub relation_adds: Vec<RelationChange>,
    /// Relation removals.
    pub relation_removes: Vec<RelationChange>,
    /// Read-only relation expansions.
    pub relation_reads: Vec<RelationReadCommand>,
    /// Fetch-and-expand requests.
    pub refreshes: Vec<Refresh>,
    /// Paged searches.
    pub searches: Vec<Search>,
}

/// One create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    /// Client name of the type, used to key the id mapping.
    pub client_type: String,
    /// Server type.
    pub type_tag: TypeTag,
    /// `Persisted` for an update, `Pending` for a create.
    pub reference: EntityRef,
    /// Attributes without `id` and `cid`.
    pub attributes: Attributes,
}

/// One deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct Deletion {
    /// Server type.
    pub type_tag: TypeTag,
    /// Entity to delete.
    pub id: EntityId,
}

/// One relation addition or removal on one holder.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationChange {
    /// Holder type.
    pub holder_type: TypeTag,
    /// Holder id, or temp id of an entity created in the same batch.
    pub holder: EntityRef,
    /// Relation metadata from the holder's schema.
    pub relation: RelationMeta,
    /// Related ids or temp ids.
    pub related: Vec<EntityRef>,
}

/// Read-only expansion of one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationReadCommand {
    /// Client key the index is reported under.
    pub client_type: String,
    /// Origin type.
    pub origin_type: TypeTag,
    /// Origin ids.
    pub ids: Vec<EntityId>,
    /// Second-level key the index is reported under.
    pub relation_type: String,
    /// Related type.
    pub related_type: TypeTag,
    /// Attribute name as the client sent it.
    pub attribute: String,
    /// Relation metadata.
    pub relation: RelationMeta,
}

/// Fetch-and-expand of some entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Refresh {
    /// Server type.
    pub type_tag: TypeTag,
    /// Ids to fetch.
    pub ids: Vec<EntityId>,
}

/// One paged search.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    /// Server type.
    pub type_tag: TypeTag,
    /// Key the page data is reported under.
    pub rails_class: String,
    /// Opaque search parameters.
    pub params: Value,
    /// Requested page as sent.
    pub page: u64,
    /// Requested page size as sent.
    pub limit: u64,
}

impl MutationBatch {
    /// Decodes a request.
    pub fn decode(request: &SyncRequest, registry: &SchemaRegistry) -> SyncResult<Self> {
        let mut batch = MutationBatch::default();

        for (client_type, group) in &request.commit_models {
            let schema = registry.resolve(&group.rails_class)?;
            for data in &group.data {
                batch.upserts.push(decode_upsert(client_type, schema, data)?);
            }
        }

        for (key, rows) in &request.destroy_models {
            let schema = registry.resolve(key)?;
            for row in rows {
                // Rows without an id were never persisted; nothing to delete.
                let Some(value) = row.get("id").filter(|v| !v.is_null()) else {
                    continue;
                };
                let id = EntityId::from_value(value).ok_or_else(|| {
                    SyncError::invalid_request(format!("invalid id {value} in destroyModels.{key}"))
                })?;
                batch.deletions.push(Deletion {
                    type_tag: schema.tag().clone(),
                    id,
                });
            }
        }

        batch.relation_adds = decode_relation_changes(&request.create_relations, registry)?;
        batch.relation_removes = decode_relation_changes(&request.destroy_relations, registry)?;

        for (client_type, read) in &request.relations {
            let origin = registry.resolve(&read.rails_class)?;
            let relation = origin.relation(&to_snake_case(&read.rails_relation_attribute))?;
            let related = registry.resolve(&read.rails_relation_class)?;
            batch.relation_reads.push(RelationReadCommand {
                client_type: client_type.clone(),
                origin_type: origin.tag().clone(),
                ids: decode_ids(&read.ids, "relations")?,
                relation_type: read.relation_type.clone(),
                related_type: related.tag().clone(),
                attribute: read.rails_relation_attribute.clone(),
                relation: relation.clone(),
            });
        }

        for (client_type, refresh) in &request.refresh_models {
            let schema = registry.resolve(&refresh.rails_class)?;
            batch.refreshes.push(Refresh {
                type_tag: schema.tag().clone(),
                ids: decode_ids(&refresh.ids, &format!("refreshModels.{client_type}"))?,
            });
        }

        for query in &request.search_models {
            let schema = registry.resolve(&query.rails_class)?;
            batch.searches.push(Search {
                type_tag: schema.tag().clone(),
                rails_class: query.rails_class.clone(),
                params: query.search_params.clone(),
                page: query.page,
                limit: query.limit,
            });
        }

        tracing::debug!(
            upserts = batch.upserts.len(),
            deletions = batch.deletions.len(),
            relation_adds = batch.relation_adds.len(),
            relation_removes = batch.relation_removes.len(),
            relation_reads = batch.relation_reads.len(),
            refreshes = batch.refreshes.len(),
            searches = batch.searches.len(),
            "decoded batch"
        );
        Ok(batch)
    }

    /// Returns true if the batch writes anything.
    pub fn has_mutations(&self) -> bool {
        !(self.upserts.is_empty()
            && self.deletions.is_empty()
            && self.relation_adds.is_empty()
            && self.relation_removes.is_empty())
    }
}

fn decode_upsert(
    client_type: &str,
    schema: &TypeSchema,
    data: &serde_json::Map<String, Value>,
) -> SyncResult<Upsert> {
    let present = |key: &str| data.get(key).filter(|v| !v.is_null());

    let reference = match (present("id"), present("cid")) {
        (Some(id), _) => EntityId::from_value(id)
            .map(EntityRef::Persisted)
            .ok_or_else(|| {
                SyncError::invalid_request(format!("invalid id {id} for {}", schema.tag()))
            })?,
        (None, Some(cid)) => match EntityRef::from_value(cid) {
            Some(EntityRef::Pending(cid)) => EntityRef::Pending(cid),
            _ => {
                return Err(SyncError::invalid_request(format!(
                    "invalid cid {cid} for {}",
                    schema.tag()
                )))
            }
        },
        (None, None) => {
            return Err(SyncError::invalid_request(format!(
                "{} entry without id or cid",
                schema.tag()
            )))
        }
    };

    let mut attributes = data.clone();
    for key in RESERVED_ATTRIBUTES {
        attributes.remove(key);
    }

    Ok(Upsert {
        client_type: client_type.to_string(),
        type_tag: schema.tag().clone(),
        reference,
        attributes,
    })
}

fn decode_relation_changes(
    section: &std::collections::BTreeMap<String, RelationChanges>,
    registry: &SchemaRegistry,
) -> SyncResult<Vec<RelationChange>> {
    let mut changes = Vec::new();
    for changes_of_type in section.values() {
        let holder_schema = registry.resolve(&changes_of_type.rails_class)?;
        for (holder_key, relations) in &changes_of_type.models {
            let holder = EntityRef::from_value(&Value::String(holder_key.clone())).ok_or_else(
                || SyncError::invalid_request(format!("invalid holder key {holder_key:?}")),
            )?;
            for (name, target) in relations {
                let Some(target) = target else { continue };
                let relation = holder_schema.relation(name)?;
                if !target.rails_class.is_empty() {
                    let related = registry.resolve(&target.rails_class)?;
                    if related.tag() != &relation.target {
                        return Err(SyncError::invalid_request(format!(
                            "relation {name} on {} targets {}, not {}",
                            holder_schema.tag(),
                            relation.target,
                            related.tag()
                        )));
                    }
                }
                let related = target
                    .ids
                    .iter()
                    .map(|value| {
                        EntityRef::from_value(value).ok_or_else(|| {
                            SyncError::invalid_request(format!("invalid related id {value}"))
                        })
                    })
                    .collect::<SyncResult<Vec<_>>>()?;
                changes.push(RelationChange {
                    holder_type: holder_schema.tag().clone(),
                    holder: holder.clone(),
                    relation: relation.clone(),
                    related,
                });
            }
        }
    }
    Ok(changes)
}

/// Decodes a list of persisted ids, dropping duplicates but keeping order.
pub(crate) fn decode_ids(values: &[Value], section: &str) -> SyncResult<Vec<EntityId>> {
    let mut seen = BTreeSet::new();
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        let id = EntityId::from_value(value)
            .ok_or_else(|| SyncError::invalid_request(format!("invalid id {value} in {section}")))?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Converts a camelCase attribute name to snake_case.
///
/// Follows Rails `underscore`: a run of capitals stays one word, so
/// `HTMLParser` becomes `html_parser`, and dashes become underscores.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            let word_break = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower);
            if word_break {
                out.push('_');
            }
        }
        match ch {
            '-' => out.push('_'),
            _ => out.push(ch.to_ascii_lowercase()),
        }
    }
    out
}
