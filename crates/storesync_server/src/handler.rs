//! Request handler: batch limits, request spans and counters.

use crate::config::ServerConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use storesync_core::{Actor, EntityStore};
use storesync_engine::SyncEngine;
use storesync_protocol::{ErrorKind, ErrorPayload, SyncRequest, SyncResponse};
use uuid::Uuid;

/// Counters over every handled request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Requests handled, including rejected ones.
    pub requests: u64,
    /// Requests answered with an error payload.
    pub failed: u64,
    /// Requests rejected by the batch limits before reaching the engine.
    pub rejected: u64,
    /// Entities created across all requests.
    pub created: u64,
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The engine every request runs through.
    pub engine: SyncEngine,
    stats: RwLock<ServerStats>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, engine: SyncEngine) -> Self {
        let engine = engine.with_config(config.engine.clone());
        Self {
            config,
            engine,
            stats: RwLock::new(ServerStats::default()),
        }
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> ServerStats {
        *self.stats.read()
    }

    fn record(&self, response: &SyncResponse, rejected: bool) {
        let mut stats = self.stats.write();
        stats.requests += 1;
        if response.is_error() {
            stats.failed += 1;
        }
        if rejected {
            stats.rejected += 1;
        }
        let created: usize = response.models_ids.values().map(|ids| ids.len()).sum();
        stats.created += created as u64;
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Checks a request against the configured batch limits.
    pub fn check_limits(&self, request: &SyncRequest) -> Result<(), ErrorPayload> {
        let config = &self.context.config;
        let mutations = request.mutation_count();
        if mutations > config.max_commit_entities {
            return Err(ErrorPayload::message(
                ErrorKind::InvalidRequest,
                format!(
                    "too many committed entities: {} > {}",
                    mutations, config.max_commit_entities
                ),
            ));
        }
        let searches = request.search_models.len();
        if searches > config.max_search_requests {
            return Err(ErrorPayload::message(
                ErrorKind::InvalidRequest,
                format!(
                    "too many searches: {} > {}",
                    searches, config.max_search_requests
                ),
            ));
        }
        Ok(())
    }

    /// Handles a sync request as `actor` against `store`.
    pub fn handle<S: EntityStore>(
        &self,
        store: &S,
        actor: Actor,
        request: &SyncRequest,
    ) -> SyncResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_request", %request_id, %actor);
        let _entered = span.enter();

        let (response, rejected) = match self.check_limits(request) {
            Ok(()) => (self.context.engine.process(store, actor, request), false),
            Err(payload) => {
                tracing::warn!(reason = %payload.kind, "request rejected by batch limits");
                (SyncResponse::failure(payload), true)
            }
        };
        self.context.record(&response, rejected);
        response
    }
}
