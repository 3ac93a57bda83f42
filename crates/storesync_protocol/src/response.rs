//! Response messages.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The merged answer to a [`SyncRequest`](crate::SyncRequest).
///
/// Either carries data sections or, when the request failed, only
/// `errors`. Empty sections are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncResponse {
    /// Entities per server type, each a flat attribute object with `id`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, Vec<Map<String, Value>>>,
    /// Relation indices: origin key → related key → index.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, BTreeMap<String, RelationIndexPayload>>,
    /// Client type → cid → persisted id, for newly created entities.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub models_ids: BTreeMap<String, BTreeMap<String, u64>>,
    /// Pagination data per searched type.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub page_data: BTreeMap<String, PageData>,
    /// Set when the request failed; all other sections are then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorPayload>,
}

impl SyncResponse {
    /// Creates a response carrying only an error.
    #[must_use]
    pub fn failure(error: ErrorPayload) -> Self {
        Self {
            errors: Some(error),
            ..Self::default()
        }
    }

    /// Returns true if the request failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.errors.is_some()
    }

    /// Returns the entities returned for a type.
    #[must_use]
    pub fn models_of(&self, rails_class: &str) -> &[Map<String, Value>] {
        self.models
            .get(rails_class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the ids returned for a type, in response order.
    #[must_use]
    pub fn ids_of(&self, rails_class: &str) -> Vec<u64> {
        self.models_of(rails_class)
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_u64))
            .collect()
    }

    /// Looks up the persisted id assigned to a cid.
    #[must_use]
    pub fn assigned_id(&self, client_type: &str, cid: &str) -> Option<u64> {
        self.models_ids.get(client_type)?.get(cid).copied()
    }

    /// Decodes a response from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the response as JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Encodes the response as indented JSON.
    pub fn encode_pretty(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Relation index of one origin type toward one related type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationIndexPayload {
    /// Relation attribute the client reassembles the association under.
    pub attribute: String,
    /// Origin id → related ids, in relation order.
    #[serde(default)]
    pub models: BTreeMap<u64, Vec<u64>>,
}

/// Pagination data for one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    /// Ids of every match, in search order, across all pages.
    pub ids: Vec<u64>,
    /// Page size used; 0 when unlimited.
    pub page_size: u64,
    /// The page returned.
    pub actual_page: u64,
    /// Total number of pages.
    pub pages: u64,
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The actor may not perform the operation.
    PermissionDenied,
    /// An entity failed validation.
    ValidationFailed,
    /// Temp id references form a cycle.
    DependencyCycle,
    /// A referenced entity or temp id does not exist.
    NotFound,
    /// A temp id appears twice in one batch.
    DuplicateTempId,
    /// A type name is not registered.
    UnknownType,
    /// A relation name is not declared.
    UnknownRelation,
    /// The request is structurally invalid.
    InvalidRequest,
    /// The store failed.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PermissionDenied => "permissionDenied",
            Self::ValidationFailed => "validationFailed",
            Self::DependencyCycle => "dependencyCycle",
            Self::NotFound => "notFound",
            Self::DuplicateTempId => "duplicateTempId",
            Self::UnknownType => "unknownType",
            Self::UnknownRelation => "unknownRelation",
            Self::InvalidRequest => "invalidRequest",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// The error section of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Error classification.
    pub kind: ErrorKind,
    /// Offending server type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rails_class: Option<String>,
    /// Offending entity's id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Offending entity's cid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    /// Temp ids involved, for dependency cycles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temp_ids: Vec<String>,
    /// Message or field errors.
    pub errors: ErrorDetail,
}

impl ErrorPayload {
    /// Creates a payload with a plain message.
    pub fn message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            rails_class: None,
            id: None,
            cid: None,
            temp_ids: Vec::new(),
            errors: ErrorDetail::Message(message.into()),
        }
    }

    /// Sets the offending type.
    #[must_use]
    pub fn with_rails_class(mut self, rails_class: impl Into<String>) -> Self {
        self.rails_class = Some(rails_class.into());
        self
    }
}

/// Error details: a message or per-field messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// A single message.
    Message(String),
    /// Field name → messages.
    Fields(BTreeMap<String, Vec<String>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_sections_are_omitted() {
        let response = SyncResponse::default();
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({}));
    }

    #[test]
    fn failure_carries_only_errors() {
        let payload = ErrorPayload::message(ErrorKind::PermissionDenied, "no write permission")
            .with_rails_class("Note");
        let response = SyncResponse::failure(payload);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"errors": {
                "kind": "permissionDenied",
                "railsClass": "Note",
                "errors": "no write permission"
            }})
        );
        assert!(response.is_error());
    }

    #[test]
    fn field_errors_serialize_as_map() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), vec!["can't be blank".to_string()]);
        let payload = ErrorPayload {
            kind: ErrorKind::ValidationFailed,
            rails_class: Some("Book".into()),
            id: None,
            cid: Some("c4".into()),
            temp_ids: Vec::new(),
            errors: ErrorDetail::Fields(fields),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["errors"]["title"], json!(["can't be blank"]));
        assert_eq!(value["cid"], json!("c4"));

        let decoded: ErrorPayload = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn relation_index_keys_are_strings_on_the_wire() {
        let mut response = SyncResponse::default();
        let mut index = RelationIndexPayload {
            attribute: "tags".into(),
            models: BTreeMap::new(),
        };
        index.models.insert(3, vec![1, 2]);
        response
            .relations
            .entry("Book".into())
            .or_default()
            .insert("Tag".into(), index);

        let bytes = response.encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["relations"]["Book"]["Tag"]["models"]["3"], json!([1, 2]));
        assert_eq!(SyncResponse::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn accessors() {
        let response: SyncResponse = serde_json::from_value(json!({
            "models": {"Book": [{"id": 2, "title": "Dune"}, {"id": 5}]},
            "modelsIds": {"book": {"c1": 5}}
        }))
        .unwrap();
        assert_eq!(response.ids_of("Book"), vec![2, 5]);
        assert!(response.models_of("Tag").is_empty());
        assert_eq!(response.assigned_id("book", "c1"), Some(5));
        assert_eq!(response.assigned_id("book", "c2"), None);
    }
}
