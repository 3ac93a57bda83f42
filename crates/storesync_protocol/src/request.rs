//! Request messages.

use crate::error::ProtocolResult;
use crate::lenient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One synchronization request.
///
/// Every section is optional. Sections are keyed by the client's name for a
/// type ("client type"); each entry also names the server type it maps to
/// (`railsClass`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncRequest {
    /// Entities to fetch and expand by id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub refresh_models: BTreeMap<String, ModelIds>,
    /// Paged searches. A single object is accepted in place of an array.
    #[serde(
        deserialize_with = "lenient::one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub search_models: Vec<SearchQuery>,
    /// Upserts per client type.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub commit_models: BTreeMap<String, CommitGroup>,
    /// Deletions per type; each attribute map carries the `id` to delete.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub destroy_models: BTreeMap<String, Vec<Map<String, Value>>>,
    /// Relation additions.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub create_relations: BTreeMap<String, RelationChanges>,
    /// Relation removals.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub destroy_relations: BTreeMap<String, RelationChanges>,
    /// Read-only relation expansions.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, RelationRead>,
}

impl SyncRequest {
    /// Decodes a request from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the request as JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns true if no section carries anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refresh_models.is_empty()
            && self.search_models.is_empty()
            && self.commit_models.is_empty()
            && self.destroy_models.is_empty()
            && self.create_relations.is_empty()
            && self.destroy_relations.is_empty()
            && self.relations.is_empty()
    }

    /// Returns the number of entities the request writes or deletes.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        let commits: usize = self.commit_models.values().map(|g| g.data.len()).sum();
        let destroys: usize = self.destroy_models.values().map(Vec::len).sum();
        commits + destroys
    }

    /// Adds an upsert group, builder style.
    #[must_use]
    pub fn with_commit(
        mut self,
        client_type: impl Into<String>,
        rails_class: impl Into<String>,
        data: Vec<Value>,
    ) -> Self {
        let group = self
            .commit_models
            .entry(client_type.into())
            .or_insert_with(|| CommitGroup::new(rails_class));
        group
            .data
            .extend(data.into_iter().filter_map(|v| v.as_object().cloned()));
        self
    }

    /// Adds a refresh, builder style.
    #[must_use]
    pub fn with_refresh(
        mut self,
        client_type: impl Into<String>,
        rails_class: impl Into<String>,
        ids: impl IntoIterator<Item = u64>,
    ) -> Self {
        self.refresh_models.insert(
            client_type.into(),
            ModelIds {
                rails_class: rails_class.into(),
                ids: ids.into_iter().map(Value::from).collect(),
            },
        );
        self
    }

    /// Adds a search, builder style.
    #[must_use]
    pub fn with_search(mut self, query: SearchQuery) -> Self {
        self.search_models.push(query);
        self
    }
}

/// A type and a list of ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIds {
    /// Server type.
    pub rails_class: String,
    /// Requested ids, as numbers or numeric strings.
    #[serde(default, deserialize_with = "lenient::list")]
    pub ids: Vec<Value>,
}

/// A paged search over one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Server type.
    pub rails_class: String,
    /// Opaque parameters handed to the type's search provider.
    #[serde(default)]
    pub search_params: Value,
    /// 1-based page; 0 means the first page.
    #[serde(default, deserialize_with = "lenient::number")]
    pub page: u64,
    /// Page size; 0 means unlimited.
    #[serde(default, deserialize_with = "lenient::number")]
    pub limit: u64,
}

impl SearchQuery {
    /// Creates an unpaged search.
    pub fn new(rails_class: impl Into<String>, search_params: Value) -> Self {
        Self {
            rails_class: rails_class.into(),
            search_params,
            page: 1,
            limit: 0,
        }
    }

    /// Sets the page and page size.
    #[must_use]
    pub fn paged(mut self, page: u64, limit: u64) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }
}

/// Upserts of one client type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitGroup {
    /// Server type.
    pub rails_class: String,
    /// Attribute maps. A map with `id` is an update; one without is a create
    /// identified by its `cid`.
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
}

impl CommitGroup {
    /// Creates an empty group.
    pub fn new(rails_class: impl Into<String>) -> Self {
        Self {
            rails_class: rails_class.into(),
            data: Vec::new(),
        }
    }
}

/// Relation changes for holders of one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationChanges {
    /// Holder's server type.
    pub rails_class: String,
    /// Holder id (or cid) → relation name → target. A null target is
    /// skipped.
    #[serde(default)]
    pub models: BTreeMap<String, BTreeMap<String, Option<RelationTarget>>>,
}

/// Related entities named in a relation change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationTarget {
    /// Related server type.
    #[serde(default)]
    pub rails_class: String,
    /// Related ids (or cids). A missing or non-array value is empty.
    #[serde(default, deserialize_with = "lenient::list")]
    pub ids: Vec<Value>,
}

/// A read-only request to expand one relation of some entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationRead {
    /// Origin server type.
    pub rails_class: String,
    /// Origin ids.
    #[serde(default, deserialize_with = "lenient::list")]
    pub ids: Vec<Value>,
    /// Client key under which the relation index is reported.
    pub relation_type: String,
    /// Related server type.
    pub rails_relation_class: String,
    /// Relation attribute, camelCase as the client names it.
    pub rails_relation_attribute: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_request() {
        let raw = json!({
            "refreshModels": {"author": {"railsClass": "Author", "ids": [1, "2"]}},
            "searchModels": {"railsClass": "Book", "searchParams": {"year": 1968}, "page": "2", "limit": 10},
            "commitModels": {
                "author": {"railsClass": "Author", "data": [{"cid": "c1", "name": "Ursula"}]}
            },
            "destroyModels": {"Book": [{"id": 4}]},
            "createRelations": {
                "book": {"railsClass": "Book", "models": {"3": {"tags": {"railsClass": "Tag", "ids": [1]}}}}
            },
            "destroyRelations": {
                "book": {"railsClass": "Book", "models": {"3": {"tags": null, "shelves": {"railsClass": "Shelf"}}}}
            },
            "relations": {
                "book": {
                    "railsClass": "Book", "ids": [3], "relationType": "bookTags",
                    "railsRelationClass": "Tag", "railsRelationAttribute": "bookTags"
                }
            }
        });

        let request = SyncRequest::decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(request.refresh_models["author"].ids, vec![json!(1), json!("2")]);
        assert_eq!(request.search_models.len(), 1);
        assert_eq!(request.search_models[0].page, 2);
        assert_eq!(request.search_models[0].limit, 10);
        assert_eq!(request.commit_models["author"].data.len(), 1);
        assert_eq!(request.mutation_count(), 2);

        let removals = &request.destroy_relations["book"].models["3"];
        assert!(removals["tags"].is_none());
        assert!(removals["shelves"].as_ref().unwrap().ids.is_empty());
        assert_eq!(request.relations["book"].rails_relation_attribute, "bookTags");
    }

    #[test]
    fn empty_request() {
        let request = SyncRequest::decode(b"{}").unwrap();
        assert!(request.is_empty());
        assert_eq!(request.encode().unwrap(), b"{}");
    }

    #[test]
    fn search_models_accepts_array() {
        let raw = br#"{"searchModels": [{"railsClass": "Book"}, {"railsClass": "Tag", "limit": "5"}]}"#;
        let request = SyncRequest::decode(raw).unwrap();
        assert_eq!(request.search_models.len(), 2);
        assert_eq!(request.search_models[0].page, 0);
        assert_eq!(request.search_models[1].limit, 5);
    }

    #[test]
    fn malformed_json_fails() {
        assert!(SyncRequest::decode(b"{\"commitModels\": 3}").is_err());
        assert!(SyncRequest::decode(b"not json").is_err());
    }

    #[test]
    fn builders() {
        let request = SyncRequest::default()
            .with_commit("author", "Author", vec![json!({"cid": "c1"})])
            .with_refresh("book", "Book", [1, 2])
            .with_search(SearchQuery::new("Tag", json!({})).paged(1, 10));
        assert_eq!(request.commit_models["author"].rails_class, "Author");
        assert_eq!(request.refresh_models["book"].ids.len(), 2);
        assert_eq!(request.search_models[0].limit, 10);
    }
}
