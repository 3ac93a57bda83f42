//! Paged search under the read scope.

use crate::batch::Search;
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::scope::ScopedQuery;
use std::ops::Range;
use storesync_core::{Entity, EntityId, Operation, StoreTransaction};

/// Normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u64,
    limit: u64,
}

impl Pagination {
    /// Normalizes a requested page and limit.
    ///
    /// Page 0 becomes 1. A limit of 0 means unlimited unless `max_page_size`
    /// is set, in which case the limit is capped to it.
    pub fn new(page: u64, limit: u64, max_page_size: Option<u64>) -> Self {
        let limit = match max_page_size {
            Some(max) if limit == 0 || limit > max => max,
            _ => limit,
        };
        Self {
            page: page.max(1),
            limit,
        }
    }

    /// Returns the 1-based page.
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Returns the page size; 0 means unlimited.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the number of pages for `total` matches.
    pub fn pages(&self, total: usize) -> u64 {
        if self.limit == 0 {
            return 1;
        }
        (total as u64).div_ceil(self.limit)
    }

    /// Returns the slice of a result of `total` matches on this page.
    pub fn range(&self, total: usize) -> Range<usize> {
        if self.limit == 0 {
            return 0..total;
        }
        let clamp = |n: u64| usize::try_from(n).map_or(total, |n| n.min(total));
        let start = clamp((self.page - 1).saturating_mul(self.limit));
        let end = clamp(self.page.saturating_mul(self.limit));
        start..end
    }
}

/// One search's results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Every match, in search order.
    pub ids: Vec<EntityId>,
    /// Entities on the requested page.
    pub page: Vec<Entity>,
    /// The normalized request.
    pub pagination: Pagination,
    /// Total number of pages.
    pub pages: u64,
}

/// Runs a search with the type's search provider over the readable entities.
pub fn run(
    scope: &ScopedQuery<'_>,
    txn: &dyn StoreTransaction,
    search: &Search,
    config: &EngineConfig,
) -> SyncResult<SearchOutcome> {
    let schema = scope.schema(&search.type_tag)?;
    let candidates = scope.all(txn, &search.type_tag, Operation::Read)?;
    let results = schema.search().search(candidates, &search.params);

    let pagination = Pagination::new(search.page, search.limit, config.max_page_size);
    let ids: Vec<EntityId> = results.iter().map(Entity::id).collect();
    let pages = pagination.pages(results.len());
    let range = pagination.range(results.len());
    let page: Vec<Entity> = results
        .into_iter()
        .skip(range.start)
        .take(range.len())
        .collect();

    tracing::debug!(
        type_tag = %search.type_tag,
        matches = ids.len(),
        page = pagination.page(),
        limit = pagination.limit(),
        returned = page.len(),
        "search"
    );
    Ok(SearchOutcome {
        ids,
        page,
        pagination,
        pages,
    })
}
