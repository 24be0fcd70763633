//! Create, update, delete and restore with optimistic cache writes.
//!
//! Every public call resolves to a typed result and emits exactly one
//! notification when it reaches a terminal state. Cache writes made before
//! the backend answers are rolled back when it refuses.

mod bulk;
mod mutation;

pub use bulk::{BulkItemResult, BulkOutcome};
pub use mutation::{MutationKind, MutationRecord, MutationStatus};

use crate::cache::{CacheSnapshot, CollectionKey, EntityCache, KeyPattern};
use crate::config::ActionsConfig;
use crate::core::{AuditStamp, Entity, EntityId, Result, SyncError};
use crate::notify::{Notification, Notifier};
use crate::repository::Repository;
use crate::session::SessionProvider;
use chrono::Utc;
use mutation::MutationLog;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

pub struct MutationCoordinator<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    cache: Arc<EntityCache>,
    session: Arc<dyn SessionProvider>,
    notifier: Arc<dyn Notifier>,
    config: ActionsConfig,
    log: MutationLog,
}

impl<E: Entity> MutationCoordinator<E> {
    pub fn new(
        repository: Arc<dyn Repository<E>>,
        cache: Arc<EntityCache>,
        session: Arc<dyn SessionProvider>,
        notifier: Arc<dyn Notifier>,
        config: ActionsConfig,
    ) -> Self {
        Self {
            repository,
            cache,
            session,
            notifier,
            config,
            log: MutationLog::default(),
        }
    }

    pub fn config(&self) -> &ActionsConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository<E>> {
        &self.repository
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Mutations dispatched and not yet notified, oldest first.
    pub fn pending_mutations(&self) -> Vec<MutationRecord> {
        self.log.pending()
    }

    pub fn is_busy(&self) -> bool {
        !self.log.is_empty()
    }

    pub async fn create(&self, draft: E::Draft) -> Result<E> {
        let span = info_span!("mutation.create", entity_type = E::entity_type());
        async move {
            let flight = self
                .log
                .begin(MutationKind::Create, Vec::new(), format!("{:?}", draft));
            let result = self.create_one(draft).await;
            flight.finish(status_of(&result));
            self.notify_single(MutationKind::Create, &result);
            result
        }
        .instrument(span)
        .await
    }

    pub async fn update(&self, id: &EntityId, patch: E::Patch) -> Result<E> {
        let span = info_span!("mutation.update", entity_type = E::entity_type(), entity_id = %id);
        async move {
            let flight = self.log.begin(
                MutationKind::Update,
                vec![id.clone()],
                format!("{:?}", patch),
            );
            let result = self.update_one(id, patch).await;
            flight.finish(status_of(&result));
            self.notify_single(MutationKind::Update, &result);
            result
        }
        .instrument(span)
        .await
    }

    /// Soft-deletes when configured, otherwise removes the row.
    pub async fn delete(&self, id: &EntityId) -> Result<()> {
        let span = info_span!("mutation.delete", entity_type = E::entity_type(), entity_id = %id);
        async move {
            let flight = self
                .log
                .begin(MutationKind::Delete, vec![id.clone()], String::new());
            let result = self.delete_one(id).await;
            flight.finish(status_of(&result));
            self.notify_single(MutationKind::Delete, &result);
            result
        }
        .instrument(span)
        .await
    }

    /// Clears the soft-delete marker. Refused unless soft delete is on.
    pub async fn restore(&self, id: &EntityId) -> Result<E> {
        let span = info_span!("mutation.restore", entity_type = E::entity_type(), entity_id = %id);
        async move {
            let flight = self
                .log
                .begin(MutationKind::Restore, vec![id.clone()], String::new());
            let result = self.restore_one(id).await;
            flight.finish(status_of(&result));
            self.notify_single(MutationKind::Restore, &result);
            result
        }
        .instrument(span)
        .await
    }

    fn stamp(&self) -> Result<AuditStamp> {
        Ok(self.session.require_actor()?.stamp())
    }

    async fn create_one(&self, draft: E::Draft) -> Result<E> {
        E::validate_draft(&draft)?;
        let stamp = self.stamp()?;
        let created = self.repository.create(draft, &stamp).await?;
        self.cache.insert_entity(&created)?;
        self.revalidate()?;
        event!(Level::DEBUG, entity_id = %created.id(), "entity created");
        Ok(created)
    }

    async fn update_one(&self, id: &EntityId, patch: E::Patch) -> Result<E> {
        E::validate_patch(&patch)?;
        let stamp = self.stamp()?;

        let snapshot = match self.cache.find::<E>(id)? {
            Some(mut local) => {
                local.apply_patch(&patch)?;
                local.metadata_mut().touch(&stamp);
                self.cache.replace_entity(&local)?
            }
            None => CacheSnapshot::default(),
        };

        match self.repository.update(id, patch, &stamp).await {
            Ok(confirmed) => {
                self.cache.replace_entity(&confirmed)?;
                self.revalidate()?;
                Ok(confirmed)
            }
            Err(err) => {
                self.cache.rollback_all(snapshot)?;
                event!(Level::ERROR, error = %err, "update rejected, cache rolled back");
                Err(err)
            }
        }
    }

    async fn delete_one(&self, id: &EntityId) -> Result<()> {
        let stamp = self.stamp()?;
        let soft = self.config.soft_delete;

        // Soft-deleted rows stay visible to queries that include them.
        let snapshot = self
            .cache
            .remove_entity_where::<E, _>(id, |key: &CollectionKey| {
                !(soft && key.include_deleted())
            })?;

        let dispatched = if soft {
            self.repository
                .set_deleted_at(id, Some(Utc::now()), &stamp)
                .await
                .map(|_| ())
        } else {
            self.repository.delete(id).await
        };

        match dispatched {
            Ok(()) => {
                self.revalidate()?;
                Ok(())
            }
            Err(err) => {
                self.cache.rollback_all(snapshot)?;
                event!(Level::ERROR, error = %err, "delete rejected, cache rolled back");
                Err(err)
            }
        }
    }

    async fn restore_one(&self, id: &EntityId) -> Result<E> {
        if !self.config.soft_delete {
            return Err(SyncError::OperationDisabled(format!(
                "restore requires soft delete for {}",
                self.config.plural_label(2)
            )));
        }
        let stamp = self.stamp()?;
        let restored = self.repository.set_deleted_at(id, None, &stamp).await?;
        self.cache.replace_entity(&restored)?;
        self.cache.insert_entity(&restored)?;
        self.revalidate()?;
        Ok(restored)
    }

    /// Marks every key of `E` stale after a confirmed write. The optimistic
    /// arrays stay readable until the refetch lands, but filtered and paged
    /// keys may now hold the wrong rows.
    fn revalidate(&self) -> Result<usize> {
        self.cache
            .invalidate(&KeyPattern::entity_type(E::entity_type()))
    }

    fn notify_single<T>(&self, kind: MutationKind, result: &Result<T>) {
        let label = &self.config.entity_label;
        let notification = match result {
            Ok(_) if !self.config.notify_success => return,
            Ok(_) => Notification::success(
                format!("{} {}", capitalize(label), kind.verb()),
                format!("The {} was {} successfully.", label, kind.verb()),
            ),
            Err(err) => Notification::error(
                err.title(),
                format!("Could not {} {}: {}", kind.infinitive(), label, err),
            ),
        };
        self.notifier.notify(notification);
    }
}

fn status_of<T>(result: &Result<T>) -> MutationStatus {
    match result {
        Ok(_) => MutationStatus::Succeeded,
        Err(_) => MutationStatus::Failed,
    }
}

pub(crate) fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
