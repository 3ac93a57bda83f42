//! Response assembler.
//!
//! Partial results of every stage accumulate here with explicit dedup and
//! merge rules; the wire response is built once at the end.

use crate::eager::{Expansion, RelationIndexSet};
use crate::error::SyncError;
use crate::executor::IdMapping;
use crate::search::SearchOutcome;
use std::collections::{BTreeMap, HashSet};
use storesync_core::{Entity, EntityId, EntityRef, TypeTag};
use storesync_protocol::{
    ErrorDetail, ErrorPayload, PageData, RelationIndexPayload, SyncResponse,
};

/// Accumulates the sections of a response.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    models: BTreeMap<TypeTag, Vec<Entity>>,
    seen: HashSet<(TypeTag, EntityId)>,
    relations: RelationIndexSet,
    models_ids: BTreeMap<String, BTreeMap<String, u64>>,
    page_data: BTreeMap<String, PageData>,
}

impl ResponseAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds entities of one type. An entity already added is skipped; the
    /// first occurrence wins.
    pub fn add_entities(&mut self, type_tag: &TypeTag, entities: impl IntoIterator<Item = Entity>) {
        for entity in entities {
            if self.seen.insert((type_tag.clone(), entity.id())) {
                self.models.entry(type_tag.clone()).or_default().push(entity);
            }
        }
    }

    /// Ensures a type appears in `models`, even with no entities.
    pub fn touch_type(&mut self, type_tag: &TypeTag) {
        self.models.entry(type_tag.clone()).or_default();
    }

    /// Merges relation indices.
    pub fn add_relations(&mut self, relations: RelationIndexSet) {
        self.relations.merge(relations);
    }

    /// Adds everything an eager expansion discovered.
    pub fn add_expansion(&mut self, expansion: Expansion) {
        for (type_tag, entities) in expansion.entities {
            self.add_entities(&type_tag, entities);
        }
        self.add_relations(expansion.relations);
    }

    /// Records the temp id mapping of a commit.
    pub fn add_id_mapping(&mut self, mapping: &IdMapping) {
        for (client_type, cid, id) in mapping.iter() {
            self.models_ids
                .entry(client_type.to_string())
                .or_default()
                .insert(cid.to_string(), id.as_u64());
        }
    }

    /// Records the page data of a search under `key`.
    pub fn add_page(&mut self, key: &str, outcome: &SearchOutcome) {
        self.page_data.insert(
            key.to_string(),
            PageData {
                ids: outcome.ids.iter().map(|id| id.as_u64()).collect(),
                page_size: outcome.pagination.limit(),
                actual_page: outcome.pagination.page(),
                pages: outcome.pages,
            },
        );
    }

    /// Returns the number of distinct entities added so far.
    pub fn entity_count(&self) -> usize {
        self.seen.len()
    }

    /// Builds the wire response.
    pub fn finish(self) -> SyncResponse {
        let models = self
            .models
            .into_iter()
            .map(|(type_tag, entities)| {
                let rows = entities.iter().map(Entity::to_json).collect();
                (type_tag.to_string(), rows)
            })
            .collect();

        let mut relations: BTreeMap<String, BTreeMap<String, RelationIndexPayload>> =
            BTreeMap::new();
        for (origin, related, index) in self.relations.iter() {
            let payload = RelationIndexPayload {
                attribute: index.attribute().to_string(),
                models: index
                    .iter()
                    .map(|(origin_id, ids)| {
                        (origin_id.as_u64(), ids.iter().map(|id| id.as_u64()).collect())
                    })
                    .collect(),
            };
            relations
                .entry(origin.to_string())
                .or_default()
                .insert(related.to_string(), payload);
        }

        SyncResponse {
            models,
            relations,
            models_ids: self.models_ids,
            page_data: self.page_data,
            errors: None,
        }
    }
}

/// Builds the error-only response for a failed request.
pub fn error_response(error: &SyncError) -> SyncResponse {
    let mut payload = ErrorPayload::message(error.kind(), error.to_string());
    payload.rails_class = error.type_tag().map(str::to_string);

    match error {
        SyncError::ValidationFailed {
            identity, errors, ..
        } => {
            set_identity(&mut payload, identity);
            payload.errors = ErrorDetail::Fields(errors.clone());
        }
        SyncError::PermissionDenied { id, .. } => payload.id = Some(id.as_u64()),
        SyncError::NotFound { reference, .. } => set_identity(&mut payload, reference),
        SyncError::DuplicateTempId { cid, .. } => payload.cid = Some(cid.to_string()),
        SyncError::DependencyCycle { temp_ids } => {
            payload.temp_ids = temp_ids.iter().map(ToString::to_string).collect();
        }
        _ => {}
    }
    SyncResponse::failure(payload)
}

fn set_identity(payload: &mut ErrorPayload, identity: &EntityRef) {
    match identity {
        EntityRef::Persisted(id) => payload.id = Some(id.as_u64()),
        EntityRef::Pending(cid) => payload.cid = Some(cid.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storesync_core::{FieldErrors, Operation, TempId};
    use storesync_protocol::ErrorKind;

    fn book(id: u64, title: &str) -> Entity {
        Entity::new(
            TypeTag::new("Book"),
            EntityId(id),
            json!({"title": title}).as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn entities_dedup_first_wins() {
        let mut assembler = ResponseAssembler::new();
        let tag = TypeTag::new("Book");
        assembler.add_entities(&tag, vec![book(2, "Dune"), book(1, "Emma")]);
        assembler.add_entities(&tag, vec![book(2, "changed"), book(3, "Ulysses")]);
        assert_eq!(assembler.entity_count(), 3);

        let response = assembler.finish();
        assert_eq!(response.ids_of("Book"), vec![2, 1, 3]);
        assert_eq!(response.models_of("Book")[0]["title"], json!("Dune"));
    }

    #[test]
    fn relations_merge_across_passes() {
        let mut assembler = ResponseAssembler::new();
        let mut first = RelationIndexSet::new();
        first.entry("Book", "Tag", "tags").push(EntityId(1), EntityId(5));
        let mut second = RelationIndexSet::new();
        second.entry("Book", "Tag", "tags").push(EntityId(1), EntityId(6));
        second.entry("Book", "Tag", "tags").push(EntityId(2), EntityId(5));
        assembler.add_relations(first);
        assembler.add_relations(second);

        let response = assembler.finish();
        let index = &response.relations["Book"]["Tag"];
        assert_eq!(index.attribute, "tags");
        assert_eq!(index.models[&1], vec![5, 6]);
        assert_eq!(index.models[&2], vec![5]);
    }

    #[test]
    fn id_mapping_and_pages() {
        let mut mapping = IdMapping::new();
        mapping.record("author", &TypeTag::new("Author"), TempId::new("c1"), EntityId(7));
        let mut assembler = ResponseAssembler::new();
        assembler.add_id_mapping(&mapping);
        let response = assembler.finish();
        assert_eq!(response.assigned_id("author", "c1"), Some(7));
        assert!(response.page_data.is_empty());
    }

    #[test]
    fn validation_error_payload() {
        let mut errors = FieldErrors::new();
        errors.insert("name".into(), vec!["can't be blank".into()]);
        let response = error_response(&SyncError::ValidationFailed {
            type_tag: "Author".into(),
            identity: EntityRef::Pending(TempId::new("c1")),
            errors,
        });

        let payload = response.errors.as_ref().unwrap();
        assert_eq!(payload.kind, ErrorKind::ValidationFailed);
        assert_eq!(payload.rails_class.as_deref(), Some("Author"));
        assert_eq!(payload.cid.as_deref(), Some("c1"));
        assert!(matches!(payload.errors, ErrorDetail::Fields(_)));
        assert!(response.models.is_empty());
    }

    #[test]
    fn permission_and_cycle_payloads() {
        let response =
            error_response(&SyncError::permission_denied("Note", Operation::Write, EntityId(4)));
        let payload = response.errors.unwrap();
        assert_eq!(payload.id, Some(4));
        assert_eq!(
            payload.errors,
            ErrorDetail::Message("no write permission on Note#4".into())
        );

        let response = error_response(&SyncError::DependencyCycle {
            temp_ids: vec![TempId::new("c1"), TempId::new("c2")],
        });
        let payload = response.errors.unwrap();
        assert_eq!(payload.temp_ids, vec!["c1", "c2"]);
        assert_eq!(payload.rails_class, None);
    }
}
