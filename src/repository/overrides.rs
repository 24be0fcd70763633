use super::{ListQuery, QueryCapabilities, Repository};
use crate::core::{AuditStamp, Entity, EntityId, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

pub type ListFn<E> = Arc<dyn Fn(ListQuery) -> BoxFuture<'static, Result<Vec<E>>> + Send + Sync>;
pub type CreateFn<E> =
    Arc<dyn Fn(<E as Entity>::Draft, AuditStamp) -> BoxFuture<'static, Result<E>> + Send + Sync>;
pub type UpdateFn<E> = Arc<
    dyn Fn(EntityId, <E as Entity>::Patch, AuditStamp) -> BoxFuture<'static, Result<E>>
        + Send
        + Sync,
>;
pub type DeleteFn = Arc<dyn Fn(EntityId) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Repository whose individual calls can be swapped out per entity type.
///
/// Calls without an override go to the fallback repository.
pub struct OverrideRepository<E: Entity> {
    fallback: Arc<dyn Repository<E>>,
    list: Option<ListFn<E>>,
    create: Option<CreateFn<E>>,
    update: Option<UpdateFn<E>>,
    delete: Option<DeleteFn>,
}

impl<E: Entity> OverrideRepository<E> {
    pub fn new(fallback: Arc<dyn Repository<E>>) -> Self {
        Self {
            fallback,
            list: None,
            create: None,
            update: None,
            delete: None,
        }
    }

    pub fn on_list<F, Fut>(mut self, list: F) -> Self
    where
        F: Fn(ListQuery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<E>>> + Send + 'static,
    {
        self.list = Some(Arc::new(move |query| list(query).boxed()));
        self
    }

    pub fn on_create<F, Fut>(mut self, create: F) -> Self
    where
        F: Fn(E::Draft, AuditStamp) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<E>> + Send + 'static,
    {
        self.create = Some(Arc::new(move |draft, stamp| create(draft, stamp).boxed()));
        self
    }

    pub fn on_update<F, Fut>(mut self, update: F) -> Self
    where
        F: Fn(EntityId, E::Patch, AuditStamp) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<E>> + Send + 'static,
    {
        self.update = Some(Arc::new(move |id, patch, stamp| {
            update(id, patch, stamp).boxed()
        }));
        self
    }

    pub fn on_delete<F, Fut>(mut self, delete: F) -> Self
    where
        F: Fn(EntityId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.delete = Some(Arc::new(move |id| delete(id).boxed()));
        self
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for OverrideRepository<E> {
    fn capabilities(&self) -> QueryCapabilities {
        match self.list {
            // An override list sees the full delegated query but promises nothing.
            Some(_) => QueryCapabilities::none(),
            None => self.fallback.capabilities(),
        }
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<E>> {
        match &self.list {
            Some(list) => list(query.clone()).await,
            None => self.fallback.list(query).await,
        }
    }

    async fn get(&self, id: &EntityId) -> Result<E> {
        self.fallback.get(id).await
    }

    async fn create(&self, draft: E::Draft, stamp: &AuditStamp) -> Result<E> {
        match &self.create {
            Some(create) => create(draft, stamp.clone()).await,
            None => self.fallback.create(draft, stamp).await,
        }
    }

    async fn update(&self, id: &EntityId, patch: E::Patch, stamp: &AuditStamp) -> Result<E> {
        match &self.update {
            Some(update) => update(id.clone(), patch, stamp.clone()).await,
            None => self.fallback.update(id, patch, stamp).await,
        }
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        match &self.delete {
            Some(delete) => delete(id.clone()).await,
            None => self.fallback.delete(id).await,
        }
    }

    async fn set_deleted_at(
        &self,
        id: &EntityId,
        deleted_at: Option<DateTime<Utc>>,
        stamp: &AuditStamp,
    ) -> Result<E> {
        self.fallback.set_deleted_at(id, deleted_at, stamp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Record, SyncError};
    use crate::repository::MemoryRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn overridden_delete_bypasses_the_fallback() {
        let memory = Arc::new(MemoryRepository::with_rows(vec![Record::new("1")]));
        let archived = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&archived);

        let repo = OverrideRepository::new(memory.clone() as Arc<dyn Repository<Record>>)
            .on_delete(move |_id| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        repo.delete(&"1".into()).await.unwrap();
        assert_eq!(archived.load(Ordering::SeqCst), 1);
        assert_eq!(memory.rows().unwrap().len(), 1);
        assert_eq!(repo.get(&"1".into()).await.unwrap().id().as_str(), "1");
    }

    #[tokio::test]
    async fn overridden_create_surfaces_its_error() {
        let memory: Arc<dyn Repository<Record>> = Arc::new(MemoryRepository::new());
        let repo = OverrideRepository::new(memory).on_create(|_draft, _stamp| async {
            Err::<Record, _>(SyncError::transport("import service down"))
        });

        let result = repo
            .create(Default::default(), &AuditStamp::new("tester"))
            .await;
        assert!(matches!(result, Err(SyncError::TransportFailure(_))));
    }
}
