//! Multi-item selection scoped to a live collection.

use crate::config::SelectionConfig;
use crate::core::{Entity, EntityId};
use crate::storage::{StateStore, load_json, save_json};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Invoked after every change of the selected set with the ids and the
/// matching entities of the current collection.
pub type SelectionCallback<E> = Arc<dyn Fn(&[EntityId], &[E]) + Send + Sync>;

/// Insertion-ordered set of entity ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    order: Vec<EntityId>,
    members: HashSet<EntityId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn remove(&mut self, id: &EntityId) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        self.order.retain(|existing| existing != id);
        true
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.order.iter()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    fn truncate(&mut self, len: usize) {
        for id in self.order.drain(len.min(self.order.len())..) {
            self.members.remove(&id);
        }
    }
}

impl FromIterator<EntityId> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Drops every selected id that no longer appears in `collection`.
pub fn reconcile<E: Entity>(selection: &SelectionSet, collection: &[E]) -> SelectionSet {
    let present: HashSet<&EntityId> = collection.iter().map(Entity::id).collect();
    selection
        .iter()
        .filter(|id| present.contains(id))
        .cloned()
        .collect()
}

/// Where the selection stands relative to its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Empty,
    Partial,
    All,
}

pub struct SelectionManager<E: Entity> {
    config: SelectionConfig,
    selected: SelectionSet,
    collection: Arc<Vec<E>>,
    /// False until the first collection arrives; restored ids wait for it.
    scoped: bool,
    on_change: Option<SelectionCallback<E>>,
    store: Option<Arc<dyn StateStore>>,
}

impl<E: Entity> fmt::Debug for SelectionManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionManager")
            .field("entity_type", &E::entity_type())
            .field("selected", &self.selected.ids())
            .field("collection_len", &self.collection.len())
            .finish()
    }
}

impl<E: Entity> SelectionManager<E> {
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            selected: SelectionSet::new(),
            collection: Arc::new(Vec::new()),
            scoped: false,
            on_change: None,
            store: None,
        }
    }

    pub fn with_on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[EntityId], &[E]) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
        self
    }

    /// Persists the selected ids under the configured key and restores the
    /// saved ones. Without a persistence key the store is ignored.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        if let Some(key) = &self.config.persistence_key {
            match load_json::<Vec<EntityId>>(store.as_ref(), key) {
                Ok(Some(ids)) => {
                    debug!(key = %key, count = ids.len(), "restored persisted selection");
                    self.selected = ids.into_iter().collect();
                    if let Some(max) = self.config.max_selection {
                        self.selected.truncate(max);
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(key = %key, error = %err, "failed to read persisted selection"),
            }
        }
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn collection(&self) -> &Arc<Vec<E>> {
        &self.collection
    }

    /// Scopes the selection to `collection`. Reconciles when the array
    /// changed and auto-reconciliation is on; the first collection always
    /// reconciles restored ids. Returns whether the selection changed.
    pub fn set_collection(&mut self, collection: Arc<Vec<E>>) -> bool {
        if self.scoped && Arc::ptr_eq(&self.collection, &collection) {
            return false;
        }
        let first = !self.scoped;
        self.collection = collection;
        self.scoped = true;

        if !(self.config.auto_reconcile || first) {
            return false;
        }
        let reconciled = reconcile(&self.selected, &self.collection);
        if reconciled.len() == self.selected.len() {
            return false;
        }
        debug!(
            entity_type = E::entity_type(),
            dropped = self.selected.len() - reconciled.len(),
            "selection reconciled"
        );
        self.selected = reconciled;
        self.changed();
        true
    }

    fn is_candidate(&self, id: &EntityId) -> bool {
        self.collection.iter().any(|entity| entity.id() == id)
    }

    fn has_room(&self) -> bool {
        self.config
            .max_selection
            .is_none_or(|max| self.selected.len() < max)
    }

    /// Adds `id`. Unknown ids and selections past the cap are ignored.
    pub fn select(&mut self, id: &EntityId) -> bool {
        if self.selected.contains(id) || !self.is_candidate(id) || !self.has_room() {
            return false;
        }
        self.selected.insert(id.clone());
        self.changed();
        true
    }

    pub fn deselect(&mut self, id: &EntityId) -> bool {
        if !self.selected.remove(id) {
            return false;
        }
        self.changed();
        true
    }

    /// Flips `id` and returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &EntityId) -> bool {
        if self.selected.contains(id) {
            self.deselect(id);
            false
        } else {
            self.select(id)
        }
    }

    /// Checks or unchecks every entity of `target`.
    ///
    /// Checking stops at the cap, keeping the first entities in order.
    /// Unchecking removes only the ids of `target`, so selections made on
    /// other pages survive. Returns the number of ids added or removed.
    pub fn select_all(&mut self, target: &[E], checked: bool) -> usize {
        let mut touched = 0;
        for entity in target {
            if checked {
                if !self.has_room() {
                    break;
                }
                if self.selected.insert(entity.id().clone()) {
                    touched += 1;
                }
            } else if self.selected.remove(entity.id()) {
                touched += 1;
            }
        }
        if touched > 0 {
            self.changed();
        }
        touched
    }

    pub fn deselect_ids(&mut self, ids: &[EntityId]) -> usize {
        let removed = ids.iter().filter(|id| self.selected.remove(id)).count();
        if removed > 0 {
            self.changed();
        }
        removed
    }

    pub fn clear(&mut self) {
        if self.selected.is_empty() {
            return;
        }
        self.selected.clear();
        self.changed();
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selected
    }

    pub fn selected_ids(&self) -> Vec<EntityId> {
        self.selected.ids().to_vec()
    }

    pub fn selection_count(&self) -> usize {
        self.selected.len()
    }

    pub fn is_selected(&self, id: &EntityId) -> bool {
        self.selected.contains(id)
    }

    pub fn is_all_selected(&self) -> bool {
        self.is_all_selected_in(&self.collection)
    }

    pub fn is_all_selected_in(&self, target: &[E]) -> bool {
        !target.is_empty() && target.iter().all(|entity| self.selected.contains(entity.id()))
    }

    pub fn state(&self) -> SelectionState {
        if self.selected.is_empty() {
            SelectionState::Empty
        } else if self.is_all_selected() {
            SelectionState::All
        } else {
            SelectionState::Partial
        }
    }

    /// Selected entities of the current collection, in selection order.
    pub fn selected_entities(&self) -> Vec<E> {
        self.selected
            .iter()
            .filter_map(|id| self.collection.iter().find(|entity| entity.id() == id))
            .cloned()
            .collect()
    }

    fn changed(&self) {
        if let (Some(store), Some(key)) = (&self.store, &self.config.persistence_key) {
            if let Err(err) = save_json(store.as_ref(), key, &self.selected.ids()) {
                warn!(key = %key, error = %err, "failed to persist selection");
            }
        }
        if let Some(callback) = &self.on_change {
            callback(self.selected.ids(), &self.selected_entities());
        }
    }
}
