use super::{ListQuery, QueryCapabilities, Repository};
use crate::core::{AuditStamp, Entity, EntityId, EntityMetadata, Result, SyncError};
use crate::filter::{apply_default, paginate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

/// Check run against every entity the backend is about to store.
pub type ServerValidator<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct Faults {
    offline: bool,
    next: Option<SyncError>,
    by_id: HashMap<EntityId, SyncError>,
}

/// In-process backend. Rows are kept newest first.
pub struct MemoryRepository<E: Entity> {
    rows: RwLock<Vec<E>>,
    capabilities: QueryCapabilities,
    validator: Option<ServerValidator<E>>,
    latency: Option<Duration>,
    faults: Mutex<Faults>,
    calls: AtomicUsize,
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            capabilities: QueryCapabilities::full(),
            validator: None,
            latency: None,
            faults: Mutex::new(Faults::default()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(rows: Vec<E>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::new()
        }
    }

    pub fn with_capabilities(mut self, capabilities: QueryCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Delays every call, so tests can interleave in-flight requests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Appends rows as they are, bypassing validation and faults.
    pub fn seed(&self, rows: impl IntoIterator<Item = E>) -> Result<()> {
        self.rows.write()?.extend(rows);
        Ok(())
    }

    pub fn rows(&self) -> Result<Vec<E>> {
        Ok(self.rows.read()?.clone())
    }

    /// Number of calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fails the next call with `error`.
    pub fn fail_next(&self, error: SyncError) -> Result<()> {
        self.faults.lock()?.next = Some(error);
        Ok(())
    }

    /// Fails every call addressed to `id` until [`clear_faults`](Self::clear_faults).
    pub fn fail_for(&self, id: impl Into<EntityId>, error: SyncError) -> Result<()> {
        self.faults.lock()?.by_id.insert(id.into(), error);
        Ok(())
    }

    pub fn set_offline(&self, offline: bool) -> Result<()> {
        self.faults.lock()?.offline = offline;
        Ok(())
    }

    pub fn clear_faults(&self) -> Result<()> {
        *self.faults.lock()? = Faults::default();
        Ok(())
    }

    async fn enter(&self, id: Option<&EntityId>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.lock()?;
        if faults.offline {
            return Err(SyncError::transport("backend unreachable"));
        }
        if let Some(error) = faults.next.take() {
            return Err(error);
        }
        if let Some(error) = id.and_then(|id| faults.by_id.get(id)) {
            return Err(error.clone());
        }
        Ok(())
    }

    fn check(&self, entity: &E) -> Result<()> {
        match &self.validator {
            Some(validator) => validator(entity),
            None => Ok(()),
        }
    }

    fn position(rows: &[E], id: &EntityId) -> Result<usize> {
        rows.iter()
            .position(|row| row.id() == id)
            .ok_or_else(|| SyncError::not_found(E::entity_type(), id))
    }

    fn write_row<F>(&self, id: &EntityId, stamp: &AuditStamp, change: F) -> Result<E>
    where
        F: FnOnce(&mut E) -> Result<()>,
    {
        let mut rows = self.rows.write()?;
        let index = Self::position(&rows, id)?;
        let mut next = rows[index].clone();
        change(&mut next)?;
        next.metadata_mut().touch(stamp);
        self.check(&next)?;
        rows[index] = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    fn capabilities(&self) -> QueryCapabilities {
        self.capabilities
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<E>> {
        self.enter(None).await?;
        let rows = self.rows.read()?;
        let visible: Vec<E> = rows
            .iter()
            .filter(|row| query.include_deleted || !row.is_deleted())
            .cloned()
            .collect();
        let matched = apply_default(&visible, &query.filters);
        debug!(
            entity_type = E::entity_type(),
            rows = matched.len(),
            "memory backend list"
        );
        Ok(paginate(&matched, query.filters.page))
    }

    async fn get(&self, id: &EntityId) -> Result<E> {
        self.enter(Some(id)).await?;
        let rows = self.rows.read()?;
        let index = Self::position(&rows, id)?;
        Ok(rows[index].clone())
    }

    async fn create(&self, draft: E::Draft, stamp: &AuditStamp) -> Result<E> {
        self.enter(None).await?;
        let entity = E::from_draft(EntityId::generate(), draft, EntityMetadata::stamped(stamp))?;
        self.check(&entity)?;
        self.rows.write()?.insert(0, entity.clone());
        Ok(entity)
    }

    async fn update(&self, id: &EntityId, patch: E::Patch, stamp: &AuditStamp) -> Result<E> {
        self.enter(Some(id)).await?;
        self.write_row(id, stamp, |row| row.apply_patch(&patch).map(|_| ()))
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        self.enter(Some(id)).await?;
        let mut rows = self.rows.write()?;
        let index = Self::position(&rows, id)?;
        rows.remove(index);
        Ok(())
    }

    async fn set_deleted_at(
        &self,
        id: &EntityId,
        deleted_at: Option<DateTime<Utc>>,
        stamp: &AuditStamp,
    ) -> Result<E> {
        self.enter(Some(id)).await?;
        self.write_row(id, stamp, |row| {
            row.metadata_mut().deleted_at = deleted_at;
            Ok(())
        })
    }
}
