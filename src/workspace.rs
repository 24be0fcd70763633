//! Process-wide wiring: one cache, one session, one notifier, one state store.

use crate::actions::MutationCoordinator;
use crate::cache::EntityCache;
use crate::config::SyncConfig;
use crate::core::{Entity, Result};
use crate::filter::{FilterEngine, FilterState, PageSpec};
use crate::list::EntityList;
use crate::notify::{Notifier, TracingNotifier};
use crate::repository::Repository;
use crate::selection::SelectionManager;
use crate::session::{Actor, Session, SessionProvider};
use crate::storage::{FileStateStore, MemoryStateStore, StateStore};
use std::sync::Arc;
use tracing::info;

/// Created once at application start. Signing out clears the cache so no
/// entity of the previous user survives.
pub struct Workspace {
    config: SyncConfig,
    cache: Arc<EntityCache>,
    session: Arc<Session>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn StateStore>,
}

impl Workspace {
    pub fn open(config: SyncConfig) -> Result<Self> {
        let store: Arc<dyn StateStore> = match &config.state_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Arc::new(FileStateStore::new(dir.clone()))
            }
            None => Arc::new(MemoryStateStore::new()),
        };
        info!(
            state_dir = ?config.state_dir,
            page_size = config.default_page_size,
            bulk = config.enable_bulk,
            soft_delete = config.soft_delete,
            "workspace opened"
        );
        Ok(Self {
            config,
            cache: Arc::new(EntityCache::new()),
            session: Arc::new(Session::new()),
            notifier: Arc::new(TracingNotifier),
            store,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn current_actor(&self) -> Option<Actor> {
        self.session.current_actor()
    }

    pub fn sign_in(&self, actor: Actor) -> Result<()> {
        info!(actor = %actor.id, "signed in");
        self.session.sign_in(actor)
    }

    pub fn sign_out(&self) -> Result<Option<Actor>> {
        let actor = self.session.sign_out()?;
        self.cache.clear()?;
        info!(actor = ?actor.as_ref().map(|actor| &actor.id), "signed out, cache cleared");
        Ok(actor)
    }

    /// Mutation coordinator for `E`, labelled `label` in notifications.
    pub fn coordinator<E: Entity>(
        &self,
        repository: Arc<dyn Repository<E>>,
        label: &str,
    ) -> MutationCoordinator<E> {
        MutationCoordinator::new(
            repository,
            Arc::clone(&self.cache),
            self.session.clone(),
            Arc::clone(&self.notifier),
            self.config.actions(label),
        )
    }

    /// Filter engine over `defaults`, paged with the configured page size
    /// unless `defaults` pages already. With a key the state is persisted.
    pub fn filter_engine<E: Entity>(
        &self,
        defaults: FilterState,
        persistence_key: Option<&str>,
    ) -> FilterEngine<E> {
        let defaults = match defaults.page {
            Some(_) => defaults,
            None => defaults.paged(PageSpec::first(self.config.default_page_size)),
        };
        let engine = FilterEngine::new(defaults);
        match persistence_key {
            Some(key) => engine.with_persistence(key, Arc::clone(&self.store)),
            None => engine,
        }
    }

    pub fn selection<E: Entity>(&self, persistence_key: Option<&str>) -> SelectionManager<E> {
        let manager = SelectionManager::new(self.config.selection(persistence_key));
        match persistence_key {
            Some(_) => manager.with_store(Arc::clone(&self.store)),
            None => manager,
        }
    }

    /// List view named `name`; filters and selection persist under
    /// `filters.<name>` and `selection.<name>`.
    pub fn entity_list<E: Entity>(
        &self,
        repository: Arc<dyn Repository<E>>,
        name: &str,
        defaults: FilterState,
    ) -> EntityList<E> {
        let filters = self.filter_engine(defaults, Some(&format!("filters.{}", name)));
        let selection = self.selection(Some(&format!("selection.{}", name)));
        EntityList::new(repository, Arc::clone(&self.cache), filters, selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CollectionKey;
    use crate::core::Record;

    #[test]
    fn sign_out_clears_the_cache() {
        let workspace = Workspace::open(SyncConfig::new()).unwrap();
        workspace.sign_in(Actor::new("u1", "Uma")).unwrap();
        workspace
            .cache()
            .set(&CollectionKey::new("record"), vec![Record::new("1")])
            .unwrap();

        let actor = workspace.sign_out().unwrap();
        assert_eq!(actor.map(|actor| actor.id), Some("u1".to_string()));
        assert!(workspace.cache().is_empty().unwrap());
        assert!(workspace.current_actor().is_none());
    }

    #[test]
    fn filter_engine_gets_the_configured_page_size() {
        let workspace = Workspace::open(SyncConfig::new().default_page_size(10)).unwrap();
        let engine = workspace.filter_engine::<Record>(FilterState::with_search(), None);
        assert_eq!(engine.filters().page, Some(PageSpec::first(10)));
    }
}
