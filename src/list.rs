//! One list view: cache read, filtered projection and scoped selection.

use crate::cache::{CacheRead, CollectionKey, EntityCache, KeyPattern};
use crate::core::{Entity, Result, SyncError};
use crate::filter::{FacetCount, FilterEngine, PageSpec};
use crate::repository::{ListQuery, Repository};
use crate::selection::{SelectionManager, SelectionState};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// What a list renders after a refresh.
#[derive(Debug, Clone)]
pub struct ListSnapshot<E> {
    /// Rows of the current page.
    pub items: Vec<E>,
    /// Rows matching the filters across all pages. When the backend pages
    /// the query this is the size of the returned page.
    pub total: usize,
    pub page: Option<PageSpec>,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<SyncError>,
    pub selection_count: usize,
    pub selection_state: SelectionState,
}

pub struct EntityList<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    cache: Arc<EntityCache>,
    filters: FilterEngine<E>,
    selection: SelectionManager<E>,
    include_deleted: bool,
}

impl<E: Entity> EntityList<E> {
    pub fn new(
        repository: Arc<dyn Repository<E>>,
        cache: Arc<EntityCache>,
        filters: FilterEngine<E>,
        selection: SelectionManager<E>,
    ) -> Self {
        Self {
            repository,
            cache,
            filters,
            selection,
            include_deleted: false,
        }
    }

    /// Lists soft-deleted rows too (trash views).
    pub fn including_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn filters(&self) -> &FilterEngine<E> {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterEngine<E> {
        &mut self.filters
    }

    pub fn selection(&self) -> &SelectionManager<E> {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionManager<E> {
        &mut self.selection
    }

    /// The part of the current filters sent to the backend.
    ///
    /// A custom predicate keeps every field constraint and the paging on the
    /// client, since the backend only knows the default matcher.
    pub fn query(&self) -> ListQuery {
        let mut capabilities = self.repository.capabilities();
        if self.filters.has_predicate() {
            capabilities = capabilities.sort_only();
        }
        ListQuery::plan(self.filters.filters(), capabilities)
            .including_deleted(self.include_deleted)
    }

    pub fn key(&self) -> CollectionKey {
        CollectionKey::for_query(E::entity_type(), &self.query().filters)
            .including_deleted(self.include_deleted)
    }

    /// Reads through the cache, fetching when the key is absent or stale.
    pub async fn refresh(&mut self) -> Result<ListSnapshot<E>> {
        let query = self.query();
        let key = self.key();
        let repository = Arc::clone(&self.repository);
        let read = self
            .cache
            .read(&key, || async move { repository.list(&query).await })
            .await?;
        Ok(self.derive(read))
    }

    /// Fetches even when the cached array is fresh.
    pub async fn reload(&mut self) -> Result<ListSnapshot<E>> {
        let query = self.query();
        let key = self.key();
        let repository = Arc::clone(&self.repository);
        let read = self
            .cache
            .refresh(&key, || async move { repository.list(&query).await })
            .await?;
        Ok(self.derive(read))
    }

    /// Re-derives the view from whatever the cache holds, without fetching.
    pub fn snapshot(&mut self) -> Result<ListSnapshot<E>> {
        let read = self.cache.peek(&self.key())?;
        Ok(self.derive(read))
    }

    pub fn invalidate(&self) -> Result<usize> {
        self.cache.invalidate(&KeyPattern::Exact(self.key()))
    }

    /// Facet counts over the cached array, before client-side filtering.
    pub fn facet_counts(&self) -> Result<BTreeMap<String, Vec<FacetCount>>> {
        let read = self.cache.peek::<E>(&self.key())?;
        Ok(self.filters.facet_counts(&read.data))
    }

    fn derive(&mut self, read: CacheRead<E>) -> ListSnapshot<E> {
        let paged_by_backend = self.query().is_paged();
        let view = self.filters.view(&read.data);
        self.selection.set_collection(Arc::clone(&view.filtered));

        let (items, total) = if paged_by_backend {
            (view.filtered.to_vec(), view.filtered.len())
        } else {
            (view.items, view.total)
        };
        debug!(
            entity_type = E::entity_type(),
            rows = items.len(),
            total,
            "list derived"
        );

        ListSnapshot {
            items,
            total,
            page: view.page,
            is_loading: read.is_loading,
            is_error: read.is_error,
            error: read.error,
            selection_count: self.selection.selection_count(),
            selection_state: self.selection.state(),
        }
    }
}
