use super::{FilterState, FilterValue, PageSpec, SortSpec, matcher};
use crate::core::{Entity, Result, SyncError, Value};
use crate::storage::{StateStore, load_json, save_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Caller-supplied predicate; replaces the default matcher entirely.
pub type FilterPredicate<E> = Arc<dyn Fn(&E, &FilterState) -> bool + Send + Sync>;

/// Named partial filter applied over the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPreset {
    pub name: String,
    pub patch: BTreeMap<String, FilterValue>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

impl FilterPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patch: BTreeMap::new(),
            sort: None,
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.patch.insert(key.into(), value);
        self
    }

    pub fn sorted_by(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetCount {
    pub value: Value,
    pub count: usize,
}

/// Projection of a collection through the current filter state.
#[derive(Debug, Clone)]
pub struct FilterView<E> {
    /// Every matching entity, sorted.
    pub filtered: Arc<Vec<E>>,
    /// The requested page of `filtered`.
    pub items: Vec<E>,
    pub total: usize,
    pub page: Option<PageSpec>,
}

struct Memo<E> {
    input: Arc<Vec<E>>,
    fields: BTreeMap<String, FilterValue>,
    sort: Option<SortSpec>,
    output: Arc<Vec<E>>,
}

struct Persistence {
    key: String,
    store: Arc<dyn StateStore>,
}

/// Owns the filter state of one list and derives filtered views from it.
pub struct FilterEngine<E: Entity> {
    defaults: FilterState,
    current: FilterState,
    presets: Vec<FilterPreset>,
    active_preset: Option<String>,
    predicate: Option<FilterPredicate<E>>,
    facet_keys: Vec<String>,
    persistence: Option<Persistence>,
    memo: Mutex<Option<Memo<E>>>,
}

impl<E: Entity> fmt::Debug for FilterEngine<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEngine")
            .field("entity_type", &E::entity_type())
            .field("current", &self.current)
            .field("active_preset", &self.active_preset)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl<E: Entity> FilterEngine<E> {
    pub fn new(defaults: FilterState) -> Self {
        Self {
            current: defaults.clone(),
            defaults,
            presets: Vec::new(),
            active_preset: None,
            predicate: None,
            facet_keys: Vec::new(),
            persistence: None,
            memo: Mutex::new(None),
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E, &FilterState) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self.invalidate_memo();
        self
    }

    pub fn with_presets(mut self, presets: Vec<FilterPreset>) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_facets<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facet_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Persists the filter state under `key` and restores a previously saved one.
    pub fn with_persistence(mut self, key: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        let key = key.into();
        match load_json::<FilterState>(store.as_ref(), &key) {
            Ok(Some(saved)) => {
                debug!(key = %key, "restored persisted filters");
                self.current = saved.normalized(&self.defaults);
            }
            Ok(None) => {}
            Err(err) => warn!(key = %key, error = %err, "failed to read persisted filters"),
        }
        self.persistence = Some(Persistence { key, store });
        self
    }

    pub fn filters(&self) -> &FilterState {
        &self.current
    }

    pub fn defaults(&self) -> &FilterState {
        &self.defaults
    }

    pub fn presets(&self) -> &[FilterPreset] {
        &self.presets
    }

    pub fn active_preset(&self) -> Option<&str> {
        self.active_preset.as_deref()
    }

    /// True when a field constraint or the sort differs from the defaults.
    /// Paging alone is not a filter.
    pub fn has_active_filters(&self) -> bool {
        self.current.fields != self.defaults.fields || self.current.sort != self.defaults.sort
    }

    /// True when a custom predicate replaces the default matcher.
    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Replaces the filter state; keys, sort and page missing from `next`
    /// take their default.
    pub fn set_filters(&mut self, next: FilterState) {
        self.current = next.normalized(&self.defaults);
        self.active_preset = None;
        self.persist();
    }

    pub fn update_filters<F>(&mut self, updater: F)
    where
        F: FnOnce(&FilterState) -> FilterState,
    {
        let next = updater(&self.current);
        self.set_filters(next);
    }

    /// Edits one key; paging restarts from the first page.
    pub fn set_filter(&mut self, key: impl Into<String>, value: FilterValue) {
        let mut next = self.current.clone();
        next.fields.insert(key.into(), value);
        next.page = next.page.map(|page| PageSpec::first(page.limit));
        self.set_filters(next);
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.set_filter(super::SEARCH_KEY, FilterValue::Text(text.into()));
    }

    /// `None` clears the sort, even when the defaults carry one.
    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.current.sort = sort;
        self.active_preset = None;
        self.persist();
    }

    /// Moves between pages without touching the active preset.
    pub fn set_page(&mut self, page: Option<PageSpec>) {
        self.current.page = page;
        self.persist();
    }

    /// Resets to the configured defaults.
    pub fn clear_filters(&mut self) {
        self.current = self.defaults.clone();
        self.active_preset = None;
        self.persist();
    }

    pub fn apply_preset(&mut self, name: &str) -> Result<()> {
        let preset = self
            .presets
            .iter()
            .find(|preset| preset.name == name)
            .cloned()
            .ok_or_else(|| SyncError::validation(format!("unknown filter preset '{}'", name)))?;

        let mut next = self.defaults.clone().patched(&preset.patch);
        if preset.sort.is_some() {
            next.sort = preset.sort;
        }
        self.current = next;
        self.active_preset = Some(preset.name);
        self.persist();
        Ok(())
    }

    fn matches(&self, entity: &E) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(entity, &self.current),
            None => matcher::matches_default(entity, &self.current),
        }
    }

    /// Filters and sorts `entities` with the current state. Paging is not
    /// applied, so the result is stable under re-application.
    pub fn apply_filters(&self, entities: &[E]) -> Vec<E> {
        let mut matched: Vec<E> = entities
            .iter()
            .filter(|entity| self.matches(entity))
            .cloned()
            .collect();
        if let Some(sort) = &self.current.sort {
            matcher::sort_entities(&mut matched, sort);
        }
        matched
    }

    /// Filtered, sorted and paged view of `collection`.
    ///
    /// The filtered array is memoised on the collection `Arc` and the filter
    /// fields, so repeated calls between changes return the same `Arc`.
    pub fn view(&self, collection: &Arc<Vec<E>>) -> FilterView<E> {
        let filtered = self.filtered(collection);
        let items = matcher::paginate(&filtered, self.current.page);
        FilterView {
            total: filtered.len(),
            filtered,
            items,
            page: self.current.page,
        }
    }

    fn filtered(&self, collection: &Arc<Vec<E>>) -> Arc<Vec<E>> {
        let Ok(mut memo) = self.memo.lock() else {
            return Arc::new(self.apply_filters(collection));
        };

        if let Some(hit) = memo.as_ref().filter(|memo| {
            Arc::ptr_eq(&memo.input, collection)
                && memo.fields == self.current.fields
                && memo.sort == self.current.sort
        }) {
            return Arc::clone(&hit.output);
        }

        let output = Arc::new(self.apply_filters(collection));
        *memo = Some(Memo {
            input: Arc::clone(collection),
            fields: self.current.fields.clone(),
            sort: self.current.sort.clone(),
            output: Arc::clone(&output),
        });
        output
    }

    /// Per-value counts for every configured facet key, computed over the
    /// unfiltered collection.
    pub fn facet_counts(&self, unfiltered: &[E]) -> BTreeMap<String, Vec<FacetCount>> {
        self.facet_keys
            .iter()
            .map(|key| {
                let counts = matcher::facet_counts(unfiltered, key)
                    .into_iter()
                    .map(|(value, count)| FacetCount { value, count })
                    .collect();
                (key.clone(), counts)
            })
            .collect()
    }

    fn invalidate_memo(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            *memo = None;
        }
    }

    fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(err) = save_json(persistence.store.as_ref(), &persistence.key, &self.current) {
            warn!(key = %persistence.key, error = %err, "failed to persist filters");
        }
    }
}
