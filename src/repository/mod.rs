//! Persistence strategy consumed by the cache and the mutation coordinator.
//!
//! Any backend can sit behind [`Repository`]; the rest of the crate only
//! relies on the result shapes. [`MemoryRepository`] is the in-process
//! backend used by the demo binary and the tests, [`OverrideRepository`]
//! replaces individual calls of another repository.

mod memory;
mod overrides;

pub use memory::{MemoryRepository, ServerValidator};
pub use overrides::{CreateFn, DeleteFn, ListFn, OverrideRepository, UpdateFn};

use crate::core::{AuditStamp, Entity, EntityId, Result};
use crate::filter::{FilterState, FilterValue, SEARCH_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Which parts of a filter state a backend evaluates itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryCapabilities {
    pub search: bool,
    /// Every non-search field constraint (facets, ranges).
    pub facets: bool,
    pub sort: bool,
    pub pagination: bool,
}

impl QueryCapabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            search: true,
            facets: true,
            sort: true,
            pagination: true,
        }
    }

    /// Drops every filtering and paging capability, keeping sort.
    pub fn sort_only(self) -> Self {
        Self {
            sort: self.sort,
            ..Self::none()
        }
    }
}

/// Backend list request: the delegated part of a filter state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListQuery {
    pub filters: FilterState,
    pub include_deleted: bool,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn including_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Splits `full` into the criteria `capabilities` lets the backend run.
    ///
    /// Inactive keys are dropped so that equivalent states plan to equal
    /// queries. Paging is only delegated when nothing active is left for the
    /// client, otherwise the backend would page over the wrong rows.
    pub fn plan(full: &FilterState, capabilities: QueryCapabilities) -> Self {
        let mut delegated = FilterState::new();
        let mut everything_delegated = true;

        for (key, value) in full.active_fields() {
            let allowed = if key == SEARCH_KEY {
                capabilities.search
            } else {
                capabilities.facets
            };
            if allowed {
                delegated.fields.insert(key.clone(), value.clone());
            } else {
                everything_delegated = false;
            }
        }

        if full.sort.is_some() {
            if capabilities.sort {
                delegated.sort = full.sort.clone();
            } else {
                everything_delegated = false;
            }
        }

        if capabilities.pagination && everything_delegated {
            delegated.page = full.page;
        }

        Self {
            filters: delegated,
            include_deleted: false,
        }
    }

    /// True when the backend pages the result itself.
    pub fn is_paged(&self) -> bool {
        self.filters.page.is_some()
    }

    pub fn search(&self) -> Option<&str> {
        self.filters.search_text()
    }

    pub fn constraint(&self, key: &str) -> Option<&FilterValue> {
        self.filters.get(key)
    }
}

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    fn capabilities(&self) -> QueryCapabilities {
        QueryCapabilities::none()
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<E>>;

    async fn get(&self, id: &EntityId) -> Result<E>;

    async fn create(&self, draft: E::Draft, stamp: &AuditStamp) -> Result<E>;

    async fn update(&self, id: &EntityId, patch: E::Patch, stamp: &AuditStamp) -> Result<E>;

    async fn delete(&self, id: &EntityId) -> Result<()>;

    /// Stamps or clears the soft-delete marker.
    async fn set_deleted_at(
        &self,
        id: &EntityId,
        deleted_at: Option<DateTime<Utc>>,
        stamp: &AuditStamp,
    ) -> Result<E>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{PageSpec, SortSpec};

    fn full_state() -> FilterState {
        FilterState::with_search()
            .search("acme")
            .field("status", FilterValue::equals("active"))
            .field("tier", FilterValue::Any)
            .sorted_by(SortSpec::asc("name"))
            .paged(PageSpec::first(25))
    }

    #[test]
    fn nothing_is_delegated_without_capabilities() {
        let query = ListQuery::plan(&full_state(), QueryCapabilities::none());
        assert_eq!(query.filters, FilterState::new());
        assert!(!query.is_paged());
    }

    #[test]
    fn full_capabilities_delegate_active_criteria_and_page() {
        let query = ListQuery::plan(&full_state(), QueryCapabilities::full());
        assert_eq!(query.search(), Some("acme"));
        assert_eq!(
            query.constraint("status"),
            Some(&FilterValue::equals("active"))
        );
        assert!(query.constraint("tier").is_none());
        assert!(query.is_paged());
    }

    #[test]
    fn partial_delegation_keeps_paging_on_the_client() {
        let capabilities = QueryCapabilities {
            search: true,
            pagination: true,
            ..QueryCapabilities::none()
        };
        let query = ListQuery::plan(&full_state(), capabilities);
        assert_eq!(query.search(), Some("acme"));
        assert!(query.constraint("status").is_none());
        assert!(query.filters.sort.is_none());
        assert!(!query.is_paged());
    }
}
