//! Process-wide cache of entity arrays keyed by [`CollectionKey`].
//!
//! The cache is the single shared mutable resource of the crate. Every other
//! component works on the `Arc<Vec<E>>` snapshots it hands out; a snapshot is
//! never mutated in place, writers swap in a new array instead.

mod key;

pub use key::{CollectionKey, KeyPattern};

use crate::core::{Entity, EntityId, Result, SyncError};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

type ErasedList = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct CacheSlot {
    data: Option<ErasedList>,
    stale: bool,
    in_flight: Option<u64>,
    error: Option<SyncError>,
    fetched_at: Option<DateTime<Utc>>,
}

impl CacheSlot {
    fn needs_fetch(&self) -> bool {
        self.data.is_none() || self.stale
    }
}

/// Result of reading one key.
///
/// `data` is never absent: while the first fetch is pending it is an empty
/// array paired with `is_loading`. A failed fetch keeps the last good array.
#[derive(Debug, Clone)]
pub struct CacheRead<E> {
    pub data: Arc<Vec<E>>,
    pub is_loading: bool,
    pub is_stale: bool,
    pub is_error: bool,
    pub error: Option<SyncError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<E> CacheRead<E> {
    fn pending() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            is_loading: true,
            is_stale: false,
            is_error: false,
            error: None,
            fetched_at: None,
        }
    }
}

/// Where an entity sat in one cached array before an optimistic write.
#[derive(Debug, Clone)]
struct Prior<E> {
    entity: E,
    index: usize,
    /// Id of the row right above it, if any.
    after: Option<EntityId>,
}

impl<E: Entity> Prior<E> {
    fn locate(list: &[E], id: &EntityId) -> Option<Self> {
        let index = list.iter().position(|entity| entity.id() == id)?;
        Some(Self {
            entity: list[index].clone(),
            index,
            after: index
                .checked_sub(1)
                .map(|above| list[above].id().clone()),
        })
    }
}

#[derive(Debug, Clone)]
enum SnapshotEntry<E> {
    /// Whole array replaced through `optimistic_apply_all`.
    Array {
        key: CollectionKey,
        previous: Arc<Vec<E>>,
    },
    /// One entity written by an entity-level helper. Rolling it back leaves
    /// the other rows of the array as they are now.
    Entity {
        key: CollectionKey,
        id: EntityId,
        prior: Option<Prior<E>>,
    },
}

impl<E> SnapshotEntry<E> {
    fn key(&self) -> &CollectionKey {
        match self {
            Self::Array { key, .. } | Self::Entity { key, .. } => key,
        }
    }
}

/// What an optimistic write replaced, for rollback.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<E> {
    entries: Vec<SnapshotEntry<E>>,
}

impl<E> Default for CacheSnapshot<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> CacheSnapshot<E> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CollectionKey> {
        self.entries.iter().map(SnapshotEntry::key)
    }
}

/// Undoes the write of one entity in `list`: puts the prior copy back where
/// it was, or drops the id when it was not there before.
fn restore_entity<E: Entity>(list: &[E], id: &EntityId, prior: Option<&Prior<E>>) -> Vec<E> {
    let mut next = list.to_vec();
    let current = next.iter().position(|entity| entity.id() == id);
    match (current, prior) {
        (Some(at), Some(prior)) => next[at] = prior.entity.clone(),
        (Some(at), None) => {
            next.remove(at);
        }
        (None, Some(prior)) => {
            let at = match &prior.after {
                None => 0,
                Some(after) => next
                    .iter()
                    .position(|entity| entity.id() == after)
                    .map_or(prior.index.min(next.len()), |above| above + 1),
            };
            next.insert(at, prior.entity.clone());
        }
        (None, None) => {}
    }
    next
}

#[derive(Default)]
pub struct EntityCache {
    slots: RwLock<HashMap<CollectionKey, CacheSlot>>,
    next_ticket: AtomicU64,
}

fn typed<E: Entity>(key: &CollectionKey, erased: &ErasedList) -> Option<Arc<Vec<E>>> {
    match Arc::clone(erased).downcast::<Vec<E>>() {
        Ok(list) => Some(list),
        Err(_) => {
            warn!(key = %key, expected = E::entity_type(), "cached array holds another entity type");
            None
        }
    }
}

fn erase<E: Entity>(list: Arc<Vec<E>>) -> ErasedList {
    list
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `key` without fetching.
    pub fn peek<E: Entity>(&self, key: &CollectionKey) -> Result<CacheRead<E>> {
        let slots = self.slots.read()?;
        let Some(slot) = slots.get(key) else {
            return Ok(CacheRead::pending());
        };

        let data = slot.data.as_ref().and_then(|erased| typed::<E>(key, erased));
        Ok(CacheRead {
            is_loading: slot.in_flight.is_some() || (data.is_none() && slot.error.is_none()),
            is_stale: slot.stale,
            is_error: slot.error.is_some(),
            error: slot.error.clone(),
            fetched_at: slot.fetched_at,
            data: data.unwrap_or_else(|| Arc::new(Vec::new())),
        })
    }

    pub fn needs_fetch(&self, key: &CollectionKey) -> Result<bool> {
        Ok(self
            .slots
            .read()?
            .get(key)
            .is_none_or(CacheSlot::needs_fetch))
    }

    /// Returns the cached array, fetching first when the key is absent or stale.
    pub async fn read<E, F, Fut>(&self, key: &CollectionKey, fetch: F) -> Result<CacheRead<E>>
    where
        E: Entity,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<E>>>,
    {
        if !self.needs_fetch(key)? {
            return self.peek(key);
        }
        self.refresh(key, fetch).await
    }

    /// Fetches unconditionally. A newer fetch for the same key supersedes this
    /// one: the older response is dropped when it arrives.
    pub async fn refresh<E, F, Fut>(&self, key: &CollectionKey, fetch: F) -> Result<CacheRead<E>>
    where
        E: Entity,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<E>>>,
    {
        let ticket = self.begin_fetch(key)?;
        debug!(key = %key, ticket, "fetching collection");
        let result = fetch().await;
        self.complete_fetch(key, ticket, result)?;
        self.peek(key)
    }

    fn begin_fetch(&self, key: &CollectionKey) -> Result<u64> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let mut slots = self.slots.write()?;
        slots.entry(key.clone()).or_default().in_flight = Some(ticket);
        Ok(ticket)
    }

    fn complete_fetch<E: Entity>(
        &self,
        key: &CollectionKey,
        ticket: u64,
        result: Result<Vec<E>>,
    ) -> Result<bool> {
        let mut slots = self.slots.write()?;
        let Some(slot) = slots.get_mut(key) else {
            debug!(key = %key, ticket, "dropping response for cleared key");
            return Ok(false);
        };
        if slot.in_flight != Some(ticket) {
            debug!(key = %key, ticket, "dropping superseded response");
            return Ok(false);
        }

        slot.in_flight = None;
        match result {
            Ok(list) => {
                slot.data = Some(erase(Arc::new(list)));
                slot.stale = false;
                slot.error = None;
                slot.fetched_at = Some(Utc::now());
            }
            Err(err) => {
                warn!(key = %key, error = %err, "collection fetch failed, keeping last good data");
                slot.stale = true;
                slot.error = Some(err);
            }
        }
        Ok(true)
    }

    pub fn get<E: Entity>(&self, key: &CollectionKey) -> Result<Option<Arc<Vec<E>>>> {
        let slots = self.slots.read()?;
        Ok(slots
            .get(key)
            .and_then(|slot| slot.data.as_ref())
            .and_then(|erased| typed::<E>(key, erased)))
    }

    /// Stores `list` as fresh server truth for `key`.
    pub fn set<E: Entity>(&self, key: &CollectionKey, list: Vec<E>) -> Result<Arc<Vec<E>>> {
        let list = Arc::new(list);
        let mut slots = self.slots.write()?;
        let slot = slots.entry(key.clone()).or_default();
        slot.data = Some(erase(Arc::clone(&list)));
        slot.stale = false;
        slot.error = None;
        slot.fetched_at = Some(Utc::now());
        Ok(list)
    }

    /// Marks matching keys stale and cancels their in-flight fetches.
    pub fn invalidate(&self, pattern: &KeyPattern) -> Result<usize> {
        let mut slots = self.slots.write()?;
        let mut count = 0;
        for (key, slot) in slots.iter_mut().filter(|(key, _)| pattern.matches(key)) {
            slot.stale = true;
            slot.in_flight = None;
            count += 1;
            debug!(key = %key, "invalidated");
        }
        Ok(count)
    }

    /// Rewrites the array of one key and returns the previous array.
    ///
    /// Keys without data are left alone and yield `None`.
    pub fn optimistic_apply<E, F>(&self, key: &CollectionKey, transform: F) -> Result<Option<Arc<Vec<E>>>>
    where
        E: Entity,
        F: FnOnce(&[E]) -> Vec<E>,
    {
        let mut slots = self.slots.write()?;
        let Some(slot) = slots.get_mut(key) else {
            return Ok(None);
        };
        let Some(previous) = slot.data.as_ref().and_then(|erased| typed::<E>(key, erased)) else {
            return Ok(None);
        };
        slot.data = Some(erase(Arc::new(transform(&previous))));
        Ok(Some(previous))
    }

    /// Rewrites every cached array of `E`. `transform` returns `None` to leave
    /// an array untouched; replaced arrays land whole in the snapshot.
    pub fn optimistic_apply_all<E, F>(&self, transform: F) -> Result<CacheSnapshot<E>>
    where
        E: Entity,
        F: FnMut(&CollectionKey, &[E]) -> Option<Vec<E>>,
    {
        self.apply_to_type(transform, |key, previous| SnapshotEntry::Array {
            key: key.clone(),
            previous,
        })
    }

    /// Like `optimistic_apply_all`, but the snapshot only remembers the entity
    /// with `id`.
    fn apply_to_entity<E, F>(&self, id: &EntityId, transform: F) -> Result<CacheSnapshot<E>>
    where
        E: Entity,
        F: FnMut(&CollectionKey, &[E]) -> Option<Vec<E>>,
    {
        self.apply_to_type(transform, |key, previous: Arc<Vec<E>>| SnapshotEntry::Entity {
            key: key.clone(),
            id: id.clone(),
            prior: Prior::locate(&previous, id),
        })
    }

    fn apply_to_type<E, F, R>(&self, mut transform: F, record: R) -> Result<CacheSnapshot<E>>
    where
        E: Entity,
        F: FnMut(&CollectionKey, &[E]) -> Option<Vec<E>>,
        R: Fn(&CollectionKey, Arc<Vec<E>>) -> SnapshotEntry<E>,
    {
        let mut slots = self.slots.write()?;
        let mut entries = Vec::new();
        for (key, slot) in slots
            .iter_mut()
            .filter(|(key, _)| key.entity_type() == E::entity_type())
        {
            let Some(previous) = slot.data.as_ref().and_then(|erased| typed::<E>(key, erased))
            else {
                continue;
            };
            if let Some(next) = transform(key, &previous) {
                slot.data = Some(erase(Arc::new(next)));
                entries.push(record(key, previous));
            }
        }
        Ok(CacheSnapshot { entries })
    }

    /// Restores a pre-optimistic array. Keys cleared in the meantime stay cleared.
    pub fn rollback<E: Entity>(&self, key: &CollectionKey, previous: Arc<Vec<E>>) -> Result<()> {
        let mut slots = self.slots.write()?;
        if let Some(slot) = slots.get_mut(key) {
            slot.data = Some(erase(previous));
        }
        Ok(())
    }

    /// Undoes an optimistic write. Entity-level entries only touch their own
    /// entity, so writes to other rows made since the snapshot survive.
    pub fn rollback_all<E: Entity>(&self, snapshot: CacheSnapshot<E>) -> Result<()> {
        if !snapshot.is_empty() {
            warn!(entity_type = E::entity_type(), keys = snapshot.len(), "rolling back optimistic write");
        }
        for entry in snapshot.entries {
            match entry {
                SnapshotEntry::Array { key, previous } => self.rollback(&key, previous)?,
                SnapshotEntry::Entity { key, id, prior } => {
                    let mut slots = self.slots.write()?;
                    let Some(slot) = slots.get_mut(&key) else {
                        continue;
                    };
                    let Some(current) = slot.data.as_ref().and_then(|erased| typed::<E>(&key, erased))
                    else {
                        continue;
                    };
                    let restored = restore_entity(&current, &id, prior.as_ref());
                    slot.data = Some(erase(Arc::new(restored)));
                }
            }
        }
        Ok(())
    }

    /// Inserts `entity` at the head of every live list of its type that does
    /// not already hold it. Backend pages after the first are marked stale
    /// instead, their rows shift rather than grow.
    pub fn insert_entity<E: Entity>(&self, entity: &E) -> Result<CacheSnapshot<E>> {
        let snapshot = self.apply_to_entity(entity.id(), |key: &CollectionKey, list: &[E]| {
            if key.is_later_page() {
                return None;
            }
            if list.iter().any(|existing| existing.id() == entity.id()) {
                return None;
            }
            if entity.is_deleted() && !key.include_deleted() {
                return None;
            }
            let mut next = Vec::with_capacity(list.len() + 1);
            next.push(entity.clone());
            next.extend_from_slice(list);
            Some(next)
        })?;

        let mut slots = self.slots.write()?;
        for (key, slot) in slots
            .iter_mut()
            .filter(|(key, _)| key.entity_type() == E::entity_type() && key.is_later_page())
        {
            slot.stale = true;
            debug!(key = %key, "later page marked stale after insert");
        }
        Ok(snapshot)
    }

    /// Replaces `entity` by id wherever it is cached.
    pub fn replace_entity<E: Entity>(&self, entity: &E) -> Result<CacheSnapshot<E>> {
        self.apply_to_entity(entity.id(), |_key: &CollectionKey, list: &[E]| {
            let position = list.iter().position(|existing| existing.id() == entity.id())?;
            let mut next = list.to_vec();
            next[position] = entity.clone();
            Some(next)
        })
    }

    /// Removes the entity with `id` from every list of `E`.
    pub fn remove_entity<E: Entity>(&self, id: &EntityId) -> Result<CacheSnapshot<E>> {
        self.remove_entity_where(id, |_key| true)
    }

    /// Removes the entity with `id` from the lists of `E` whose key passes `scope`.
    pub fn remove_entity_where<E, P>(&self, id: &EntityId, scope: P) -> Result<CacheSnapshot<E>>
    where
        E: Entity,
        P: Fn(&CollectionKey) -> bool,
    {
        self.apply_to_entity(id, |key: &CollectionKey, list: &[E]| {
            if !scope(key) || !list.iter().any(|existing| existing.id() == id) {
                return None;
            }
            Some(
                list.iter()
                    .filter(|existing| existing.id() != id)
                    .cloned()
                    .collect(),
            )
        })
    }

    /// First cached copy of the entity with `id`.
    pub fn find<E: Entity>(&self, id: &EntityId) -> Result<Option<E>> {
        let slots = self.slots.read()?;
        let found = slots
            .iter()
            .filter(|(key, _)| key.entity_type() == E::entity_type())
            .filter_map(|(key, slot)| slot.data.as_ref().and_then(|erased| typed::<E>(key, erased)))
            .find_map(|list| list.iter().find(|entity| entity.id() == id).cloned());
        Ok(found)
    }

    pub fn keys(&self) -> Result<Vec<CollectionKey>> {
        Ok(self.slots.read()?.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.slots.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.slots.read()?.is_empty())
    }

    /// Drops every key; pending fetches are discarded on arrival.
    pub fn clear(&self) -> Result<()> {
        let mut slots = self.slots.write()?;
        let dropped = slots.len();
        slots.clear();
        debug!(dropped, "cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;
    use crate::filter::{FilterState, PageSpec};

    fn acme_beta() -> Vec<Record> {
        vec![
            Record::new("1").with("name", "Acme"),
            Record::new("2").with("name", "Beta"),
        ]
    }

    #[test]
    fn peek_on_unknown_key_is_empty_and_loading() {
        let cache = EntityCache::new();
        let read = cache.peek::<Record>(&CollectionKey::new("record")).unwrap();
        assert!(read.data.is_empty());
        assert!(read.is_loading);
        assert!(!read.is_error);
    }

    #[test]
    fn equal_keys_share_the_same_array() {
        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        cache.set(&key, acme_beta()).unwrap();

        let first = cache.peek::<Record>(&key).unwrap().data;
        let second = cache.peek::<Record>(&key.clone()).unwrap().data;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn optimistic_apply_and_rollback() {
        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        let original = cache.set(&key, acme_beta()).unwrap();

        let previous = cache
            .optimistic_apply(&key, |list: &[Record]| {
                list.iter().filter(|r| r.id().as_str() != "2").cloned().collect()
            })
            .unwrap()
            .expect("key has data");
        assert_eq!(cache.get::<Record>(&key).unwrap().unwrap().len(), 1);

        cache.rollback(&key, previous).unwrap();
        let restored = cache.get::<Record>(&key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&restored, &original));
    }

    #[test]
    fn insert_skips_lists_that_already_hold_the_entity() {
        let cache = EntityCache::new();
        let all = CollectionKey::new("record");
        let other = CollectionKey::new("record").including_deleted(true);
        cache.set(&all, acme_beta()).unwrap();
        cache.set(&other, vec![Record::new("3").with("name", "Gamma")]).unwrap();

        let snapshot = cache.insert_entity(&Record::new("3").with("name", "Gamma")).unwrap();
        assert_eq!(snapshot.len(), 1);
        let head = cache.get::<Record>(&all).unwrap().unwrap();
        assert_eq!(head[0].id().as_str(), "3");
        assert_eq!(head.len(), 3);
    }

    fn ids(list: &[Record]) -> Vec<&str> {
        list.iter().map(|record| record.id().as_str()).collect()
    }

    #[test]
    fn entity_rollback_keeps_unrelated_writes() {
        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        let original = cache.set(&key, acme_beta()).unwrap();

        let renamed = Record::new("1").with("name", "Acme Ltd");
        let snapshot = cache.replace_entity(&renamed).unwrap();
        cache.insert_entity(&Record::new("3").with("name", "Gamma")).unwrap();
        cache.rollback_all(snapshot).unwrap();

        let now = cache.get::<Record>(&key).unwrap().unwrap();
        assert_eq!(ids(&now), vec!["3", "1", "2"]);
        assert_eq!(now[1], original[0]);
    }

    #[test]
    fn removed_entity_returns_below_its_old_neighbour() {
        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        cache
            .set(&key, vec![Record::new("1"), Record::new("2"), Record::new("3")])
            .unwrap();

        let snapshot = cache.remove_entity::<Record>(&"2".into()).unwrap();
        cache.insert_entity(&Record::new("4")).unwrap();
        cache.rollback_all(snapshot).unwrap();

        let now = cache.get::<Record>(&key).unwrap().unwrap();
        assert_eq!(ids(&now), vec!["4", "1", "2", "3"]);
    }

    #[test]
    fn insert_leaves_later_pages_alone_and_stale() {
        let cache = EntityCache::new();
        let first = CollectionKey::for_query("record", &FilterState::new().paged(PageSpec::first(2)));
        let second = CollectionKey::for_query(
            "record",
            &FilterState::new().paged(PageSpec::first(2).next()),
        );
        cache.set(&first, acme_beta()).unwrap();
        cache
            .set(&second, vec![Record::new("5"), Record::new("6")])
            .unwrap();

        let snapshot = cache.insert_entity(&Record::new("9")).unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec![&first]);
        assert_eq!(ids(&cache.get::<Record>(&first).unwrap().unwrap())[0], "9");
        assert_eq!(
            ids(&cache.get::<Record>(&second).unwrap().unwrap()),
            vec!["5", "6"]
        );
        assert!(cache.needs_fetch(&second).unwrap());
        assert!(!cache.needs_fetch(&first).unwrap());
    }

    #[test]
    fn wrong_entity_type_reads_as_absent() {
        #[derive(Debug, Clone)]
        struct Other(Record);
        impl Entity for Other {
            type Draft = crate::core::RecordFields;
            type Patch = crate::core::RecordFields;
            fn entity_type() -> &'static str {
                "record"
            }
            fn id(&self) -> &EntityId {
                self.0.id()
            }
            fn metadata(&self) -> &crate::core::EntityMetadata {
                self.0.metadata()
            }
            fn metadata_mut(&mut self) -> &mut crate::core::EntityMetadata {
                self.0.metadata_mut()
            }
            fn fields(&self) -> Vec<(String, crate::core::Value)> {
                self.0.fields()
            }
            fn from_draft(
                id: EntityId,
                draft: Self::Draft,
                metadata: crate::core::EntityMetadata,
            ) -> Result<Self> {
                Record::from_draft(id, draft, metadata).map(Other)
            }
            fn apply_patch(&mut self, patch: &Self::Patch) -> Result<bool> {
                self.0.apply_patch(patch)
            }
            fn to_draft(&self) -> Self::Draft {
                self.0.to_draft()
            }
            fn patch_from_draft(draft: Self::Draft) -> Self::Patch {
                draft
            }
        }

        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        cache.set(&key, acme_beta()).unwrap();
        assert!(cache.get::<Other>(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_error_keeps_last_good_array() {
        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        cache.set(&key, acme_beta()).unwrap();
        cache.invalidate(&KeyPattern::All).unwrap();

        let read = cache
            .read::<Record, _, _>(&key, || async {
                Err(SyncError::transport("backend unreachable"))
            })
            .await
            .unwrap();
        assert!(read.is_error);
        assert_eq!(read.data.len(), 2);
        assert!(matches!(read.error, Some(SyncError::TransportFailure(_))));
    }

    #[tokio::test]
    async fn fresh_key_is_not_refetched() {
        let cache = EntityCache::new();
        let key = CollectionKey::new("record");
        cache.set(&key, acme_beta()).unwrap();

        let read = cache
            .read::<Record, _, _>(&key, || async {
                panic!("fresh keys must not fetch");
            })
            .await
            .unwrap();
        assert_eq!(read.data.len(), 2);
        assert!(!read.is_loading);
    }
}
