//! Declarative filtering, sorting and paging over in-memory collections.

mod engine;
mod matcher;

pub use engine::{FacetCount, FilterEngine, FilterPredicate, FilterPreset, FilterView};
pub use matcher::{apply_default, facet_counts, matches_default, paginate, sort_entities};

use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter key holding the free-text search.
pub const SEARCH_KEY: &str = "search";

/// Constraint on one filter key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    /// Unconstrained.
    Any,
    /// Case-insensitive substring match.
    Text(String),
    Equals(Value),
    /// Field value must be one of these; an empty list is unconstrained.
    OneOf(Vec<Value>),
    /// Inclusive bounds; a missing bound is open.
    Range {
        from: Option<Value>,
        to: Option<Value>,
    },
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn equals(value: impl Into<Value>) -> Self {
        Self::Equals(value.into())
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn range(from: Option<Value>, to: Option<Value>) -> Self {
        Self::Range { from, to }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Any => false,
            Self::Text(text) => !text.trim().is_empty(),
            Self::Equals(_) => true,
            Self::OneOf(values) => !values.is_empty(),
            Self::Range { from, to } => from.is_some() || to.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSpec {
    pub offset: usize,
    pub limit: usize,
}

impl PageSpec {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }

    pub fn next(self) -> Self {
        Self::new(self.offset + self.limit, self.limit)
    }
}

/// Complete filter state: field constraints plus sort and page.
///
/// A state is always normalised against a default shape, so every declared
/// key is present and "no filters active" is a plain equality check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub fields: BTreeMap<String, FilterValue>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub page: Option<PageSpec>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default shape with an empty search key.
    pub fn with_search() -> Self {
        Self::new().field(SEARCH_KEY, FilterValue::text(""))
    }

    pub fn field(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn search(self, text: impl Into<String>) -> Self {
        self.field(SEARCH_KEY, FilterValue::Text(text.into()))
    }

    pub fn sorted_by(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paged(mut self, page: PageSpec) -> Self {
        self.page = Some(page);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.fields.get(key)
    }

    pub fn search_text(&self) -> Option<&str> {
        match self.fields.get(SEARCH_KEY) {
            Some(FilterValue::Text(text)) if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        }
    }

    /// Fills every key of `defaults` that `self` leaves out, sort and page
    /// included.
    pub fn normalized(mut self, defaults: &FilterState) -> Self {
        for (key, value) in &defaults.fields {
            self.fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if self.sort.is_none() {
            self.sort = defaults.sort.clone();
        }
        if self.page.is_none() {
            self.page = defaults.page;
        }
        self
    }

    /// Overlays the keys of `patch` on top of `self`.
    pub fn patched(mut self, patch: &BTreeMap<String, FilterValue>) -> Self {
        for (key, value) in patch {
            self.fields.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn active_fields(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.fields.iter().filter(|(_, value)| value.is_active())
    }

    pub fn has_active_fields(&self) -> bool {
        self.active_fields().next().is_some()
    }

    /// Canonical string form; equal states produce equal signatures.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
