//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler, ServerStats};
use std::sync::Arc;
use storesync_core::{Actor, EntityStore, SchemaRegistry};
use storesync_engine::SyncEngine;
use storesync_protocol::{SyncRequest, SyncResponse};

/// The sync server.
///
/// Owns the store and runs every request through the engine. Transport and
/// routing are left to the embedding application, which hands request bodies
/// to [`handle_json`](Self::handle_json) together with the authenticated
/// actor.
///
/// # Example
///
/// ```
/// use storesync_core::{Actor, MemoryStore, SchemaRegistry, TypeSchema};
/// use storesync_server::{ServerConfig, SyncServer};
///
/// let registry = SchemaRegistry::new().with(TypeSchema::new("Tag")).unwrap();
/// let server = SyncServer::new(ServerConfig::default(), registry, MemoryStore::new()).unwrap();
///
/// let body = br#"{"commitModels": {"tag": {"railsClass": "Tag", "data": [{"cid": "c1"}]}}}"#;
/// let response = server.handle_json(Actor::anonymous(), body).unwrap();
/// assert!(String::from_utf8(response).unwrap().contains(r#""c1":1"#));
/// ```
pub struct SyncServer<S: EntityStore> {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    store: S,
}

impl<S: EntityStore> SyncServer<S> {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig, registry: SchemaRegistry, store: S) -> ServerResult<Self> {
        let engine = SyncEngine::new(registry)?;
        Ok(Self::with_engine(config, engine, store))
    }

    /// Creates a sync server around an existing engine.
    ///
    /// The engine's configuration is replaced by `config.engine`.
    pub fn with_engine(config: ServerConfig, engine: SyncEngine, store: S) -> Self {
        let context = Arc::new(HandlerContext::new(config, engine));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            store,
        }
    }

    /// Handles a decoded request.
    pub fn handle(&self, actor: Actor, request: &SyncRequest) -> SyncResponse {
        self.handler.handle(&self.store, actor, request)
    }

    /// Handles a JSON request body and returns the JSON response body.
    ///
    /// A body that is not a sync request fails with
    /// [`ServerError::InvalidRequest`]; every other failure is reported in
    /// the response's error payload.
    pub fn handle_json(&self, actor: Actor, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = SyncRequest::decode(body).map_err(|err| {
            tracing::warn!(%actor, error = %err, "malformed request body");
            ServerError::malformed(&err)
        })?;
        self.handle(actor, &request)
            .encode()
            .map_err(|err| ServerError::Encoding(err.to_string()))
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the request counters.
    pub fn stats(&self) -> ServerStats {
        self.context.stats()
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storesync_core::{MemoryStore, TypeSchema};
    use storesync_protocol::{ErrorKind, SearchQuery};

    fn server(config: ServerConfig) -> SyncServer<MemoryStore> {
        let registry = SchemaRegistry::new()
            .with(TypeSchema::new("Tag").with_client_type("tag"))
            .unwrap();
        SyncServer::new(config, registry, MemoryStore::new()).unwrap()
    }

    fn commit_tags(count: usize) -> SyncRequest {
        let rows = (0..count).map(|i| json!({"cid": format!("c{i}")})).collect();
        SyncRequest::default().with_commit("tag", "Tag", rows)
    }

    #[test]
    fn server_lifecycle() {
        let server = server(ServerConfig::default());
        assert_eq!(server.stats(), ServerStats::default());
        assert!(server.store().is_empty());
    }

    #[test]
    fn commit_flow() {
        let server = server(ServerConfig::default());
        let response = server.handle(Actor::anonymous(), &commit_tags(2));

        assert!(!response.is_error());
        assert_eq!(response.assigned_id("tag", "c1"), Some(2));
        assert_eq!(server.store().len(), 2);

        let stats = server.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn oversized_commit_rejected() {
        let server = server(ServerConfig::new().with_max_commit_entities(3));
        let response = server.handle(Actor::anonymous(), &commit_tags(4));

        assert_eq!(response.errors.unwrap().kind, ErrorKind::InvalidRequest);
        assert!(server.store().is_empty());
        assert_eq!(server.stats().rejected, 1);
    }

    #[test]
    fn too_many_searches_rejected() {
        let server = server(ServerConfig::new().with_max_search_requests(1));
        let request = SyncRequest::default()
            .with_search(SearchQuery::new("Tag", json!({})))
            .with_search(SearchQuery::new("Tag", json!({})));
        let response = server.handle(Actor::anonymous(), &request);
        assert_eq!(response.errors.unwrap().kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn malformed_body_is_transport_error() {
        let server = server(ServerConfig::default());
        let err = server.handle_json(Actor::anonymous(), b"[1, 2").unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(server.stats().requests, 0);
    }

    #[test]
    fn engine_errors_stay_in_payload() {
        let server = server(ServerConfig::default());
        let body = json!({"refreshModels": {"x": {"railsClass": "Ghost", "ids": [1]}}});
        let bytes = server
            .handle_json(Actor::anonymous(), body.to_string().as_bytes())
            .unwrap();
        let response = SyncResponse::decode(&bytes).unwrap();
        assert_eq!(response.errors.unwrap().kind, ErrorKind::UnknownType);
        assert_eq!(server.stats().failed, 1);
    }
}
