//! Request processing: runs every stage of a batch inside one transaction.

use crate::assembler::{error_response, ResponseAssembler};
use crate::batch::{MutationBatch, RelationReadCommand};
use crate::config::EngineConfig;
use crate::eager::{EagerLoader, RelationIndex, RelationIndexSet};
use crate::error::SyncResult;
use crate::executor::PersistenceExecutor;
use crate::relations::RelationMutator;
use crate::scope::ScopedQuery;
use crate::search;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use storesync_core::{
    Actor, Cardinality, Entity, EntityId, EntityStore, JoinQuery, Operation, SchemaRegistry,
    StoreTransaction, TypeTag,
};
use storesync_protocol::{SyncRequest, SyncResponse};

/// The sync engine.
///
/// Holds the validated schema registry and the engine configuration. Each
/// call to [`process`](Self::process) runs in its own write transaction.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
}

impl SyncEngine {
    /// Creates an engine after validating the registry.
    pub fn new(registry: SchemaRegistry) -> SyncResult<Self> {
        Self::from_shared(Arc::new(registry))
    }

    /// Creates an engine over a shared registry.
    pub fn from_shared(registry: Arc<SchemaRegistry>) -> SyncResult<Self> {
        registry.validate()?;
        Ok(Self {
            registry,
            config: EngineConfig::default(),
        })
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Processes a request, turning a failure into an error-only response.
    ///
    /// Nothing the request wrote is visible after a failure.
    pub fn process<S: EntityStore>(
        &self,
        store: &S,
        actor: Actor,
        request: &SyncRequest,
    ) -> SyncResponse {
        match self.try_process(store, actor, request) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%actor, kind = %err.kind(), error = %err, "sync request rolled back");
                error_response(&err)
            }
        }
    }

    /// Processes a request.
    ///
    /// Stages run in order: commit, destroy, relation additions, relation
    /// removals, relation reads, refreshes, searches. Any error rolls the
    /// transaction back.
    pub fn try_process<S: EntityStore>(
        &self,
        store: &S,
        actor: Actor,
        request: &SyncRequest,
    ) -> SyncResult<SyncResponse> {
        let batch = MutationBatch::decode(request, &self.registry)?;
        let scope = ScopedQuery::new(&self.registry, actor);

        let (response, stats) =
            store.transaction(|txn| RequestRun::new(scope, &self.config).run(txn, &batch))?;

        tracing::info!(
            %actor,
            upserts = batch.upserts.len(),
            created = stats.created,
            deleted = stats.deleted,
            relation_changes = batch.relation_adds.len() + batch.relation_removes.len(),
            searches = batch.searches.len(),
            returned = stats.returned,
            visited = stats.visited,
            "sync request processed"
        );
        Ok(response)
    }
}

/// Counters of one processed request.
#[derive(Debug, Clone, Copy, Default)]
struct RunStats {
    created: usize,
    deleted: usize,
    returned: usize,
    visited: usize,
}

/// State of one request while its stages run.
struct RequestRun<'a> {
    scope: ScopedQuery<'a>,
    config: &'a EngineConfig,
    loader: EagerLoader,
    assembler: ResponseAssembler,
    seeds: Vec<(TypeTag, EntityId)>,
}

impl<'a> RequestRun<'a> {
    fn new(scope: ScopedQuery<'a>, config: &'a EngineConfig) -> Self {
        Self {
            scope,
            config,
            loader: EagerLoader::new(),
            assembler: ResponseAssembler::new(),
            seeds: Vec::new(),
        }
    }

    fn run(
        mut self,
        txn: &mut dyn StoreTransaction,
        batch: &MutationBatch,
    ) -> SyncResult<(SyncResponse, RunStats)> {
        let executor = PersistenceExecutor::new(self.scope, self.config);
        let outcome = executor.commit(txn, &batch.upserts)?;
        self.seeds.extend(outcome.touched().cloned());
        self.assembler.add_id_mapping(&outcome.id_mapping);

        let deleted: HashSet<(TypeTag, EntityId)> = executor
            .destroy(txn, &batch.deletions)?
            .into_iter()
            .collect();

        let mutator = RelationMutator::new(self.scope, &outcome.id_mapping);
        for change in &batch.relation_adds {
            let touched = mutator.add(txn, change)?;
            self.seeds.extend(touched);
        }
        for change in &batch.relation_removes {
            let touched = mutator.remove(txn, change)?;
            self.seeds.extend(touched);
        }

        for read in &batch.relation_reads {
            self.read_relation(&*txn, read)?;
        }

        for (type_tag, ids) in group_seeds(&self.seeds, &deleted) {
            self.refresh(&*txn, &type_tag, &ids)?;
        }
        for refresh in &batch.refreshes {
            self.assembler.touch_type(&refresh.type_tag);
            self.refresh(&*txn, &refresh.type_tag, &refresh.ids)?;
        }

        for query in &batch.searches {
            let outcome = search::run(&self.scope, &*txn, query, self.config)?;
            self.assembler.touch_type(&query.type_tag);
            self.assembler.add_page(&query.rails_class, &outcome);
            let page_ids: Vec<EntityId> = outcome.page.iter().map(Entity::id).collect();
            self.assembler.add_entities(&query.type_tag, outcome.page);
            self.expand(&*txn, &query.type_tag, &page_ids)?;
        }

        let stats = RunStats {
            created: outcome.id_mapping.len(),
            deleted: deleted.len(),
            returned: self.assembler.entity_count(),
            visited: self.loader.visited_count(),
        };
        Ok((self.assembler.finish(), stats))
    }

    /// Returns the readable entities among `ids` and everything they eagerly
    /// pull in.
    fn refresh(
        &mut self,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        ids: &[EntityId],
    ) -> SyncResult<()> {
        let found = self.scope.where_ids(txn, type_tag, Operation::Read, ids)?;
        let found_ids: Vec<EntityId> = found.iter().map(Entity::id).collect();
        self.assembler.add_entities(type_tag, found);
        self.expand(txn, type_tag, &found_ids)
    }

    fn expand(
        &mut self,
        txn: &dyn StoreTransaction,
        type_tag: &TypeTag,
        ids: &[EntityId],
    ) -> SyncResult<()> {
        let expansion = self.loader.expand(&self.scope, txn, type_tag, ids)?;
        self.assembler.add_expansion(expansion);
        Ok(())
    }

    /// Reports one relation of some origins as an index and returns the
    /// related entities.
    ///
    /// Many-valued relations get an entry for every readable origin, even an
    /// empty one. Related entities outside the read scope are left out of
    /// both the index and the models.
    fn read_relation(
        &mut self,
        txn: &dyn StoreTransaction,
        read: &RelationReadCommand,
    ) -> SyncResult<()> {
        let origin_schema = self.scope.schema(&read.origin_type)?;
        let related_schema = self.scope.schema(&read.related_type)?;

        let origins: Vec<EntityId> = self
            .scope
            .where_ids(txn, &read.origin_type, Operation::Read, &read.ids)?
            .iter()
            .map(Entity::id)
            .collect();
        if origins.is_empty() {
            return Ok(());
        }

        let query = JoinQuery::new(origin_schema, &read.relation, related_schema, origins.clone());
        let rows = txn.join(&query)?;
        tracing::debug!(query = %query.describe(), rows = rows.len(), "relation read");

        let related_ids: Vec<EntityId> = rows.iter().map(|row| row.related).collect();
        let related = self
            .scope
            .where_ids(txn, &read.related_type, Operation::Read, &related_ids)?;
        let visible: HashSet<EntityId> = related.iter().map(Entity::id).collect();

        let mut index = RelationIndex::new(read.attribute.as_str());
        if read.relation.cardinality() == Cardinality::Many {
            for origin in &origins {
                index.touch(*origin);
            }
        }
        for row in rows.iter().filter(|row| visible.contains(&row.related)) {
            index.push(row.origin, row.related);
        }
        if !index.is_empty() {
            let mut relations = RelationIndexSet::new();
            relations
                .entry(&read.client_type, &read.relation_type, &read.attribute)
                .merge(index);
            self.assembler.add_relations(relations);
        }

        let related_ids: Vec<EntityId> = related.iter().map(Entity::id).collect();
        self.assembler.add_entities(&read.related_type, related);
        self.expand(txn, &read.related_type, &related_ids)
    }
}

/// Groups refresh seeds by type. Ids keep their first occurrence order and
/// deleted entities are skipped.
fn group_seeds(
    seeds: &[(TypeTag, EntityId)],
    deleted: &HashSet<(TypeTag, EntityId)>,
) -> BTreeMap<TypeTag, Vec<EntityId>> {
    let mut grouped: BTreeMap<TypeTag, Vec<EntityId>> = BTreeMap::new();
    for seed in seeds {
        if deleted.contains(seed) {
            continue;
        }
        let ids = grouped.entry(seed.0.clone()).or_default();
        if !ids.contains(&seed.1) {
            ids.push(seed.1);
        }
    }
    grouped
}
