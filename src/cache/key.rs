use crate::filter::{FilterState, PageSpec, SortSpec};
use std::fmt;

/// Identifies one cached array: entity type, delegated filters and sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    entity_type: String,
    signature: String,
    sort: Option<SortSpec>,
    page: Option<PageSpec>,
    include_deleted: bool,
}

impl CollectionKey {
    /// Unfiltered key for an entity type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            signature: String::new(),
            sort: None,
            page: None,
            include_deleted: false,
        }
    }

    /// Key for the backend query described by `filters`.
    pub fn for_query(entity_type: impl Into<String>, filters: &FilterState) -> Self {
        let mut fields_only = filters.clone();
        let sort = fields_only.sort.take();
        let signature = if fields_only == FilterState::default() {
            String::new()
        } else {
            fields_only.signature()
        };
        Self {
            entity_type: entity_type.into(),
            signature,
            sort,
            page: filters.page,
            include_deleted: false,
        }
    }

    pub fn including_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Backend page this key holds, when the query was paged.
    pub fn page(&self) -> Option<PageSpec> {
        self.page
    }

    /// True for backend pages after the first one.
    pub fn is_later_page(&self) -> bool {
        self.page.is_some_and(|page| page.offset > 0)
    }

    pub fn include_deleted(&self) -> bool {
        self.include_deleted
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity_type)?;
        if !self.signature.is_empty() {
            write!(f, "[{}]", self.signature)?;
        }
        if let Some(sort) = &self.sort {
            write!(f, " sort={}:{:?}", sort.field, sort.direction)?;
        }
        if self.include_deleted {
            write!(f, " +deleted")?;
        }
        Ok(())
    }
}

/// Selects cache keys for invalidation.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPattern {
    All,
    EntityType(String),
    Exact(CollectionKey),
    /// Keys of the entity type whose query includes soft-deleted rows.
    IncludingDeleted(String),
}

impl KeyPattern {
    pub fn entity_type(entity_type: impl Into<String>) -> Self {
        Self::EntityType(entity_type.into())
    }

    pub fn matches(&self, key: &CollectionKey) -> bool {
        match self {
            Self::All => true,
            Self::EntityType(entity_type) => key.entity_type == *entity_type,
            Self::Exact(exact) => key == exact,
            Self::IncludingDeleted(entity_type) => {
                key.include_deleted && key.entity_type == *entity_type
            }
        }
    }
}
