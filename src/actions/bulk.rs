use super::mutation::{MutationKind, MutationStatus};
use super::{MutationCoordinator, capitalize};
use crate::core::{Entity, EntityId, Result, SyncError};
use crate::notify::{Notification, Severity};
use crate::selection::SelectionManager;
use std::future::Future;
use tracing::{Instrument, Level, event, info_span};

/// Result of one item of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    /// Position in the submitted batch.
    pub index: usize,
    /// Target id; for creates, the id assigned by the backend.
    pub id: Option<EntityId>,
    pub success: bool,
    pub error: Option<SyncError>,
}

/// Aggregate of a sequential batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    pub kind: MutationKind,
    pub items: Vec<BulkItemResult>,
    pub success_count: usize,
    pub failed_count: usize,
    pub status: MutationStatus,
}

impl BulkOutcome {
    fn from_items(kind: MutationKind, items: Vec<BulkItemResult>) -> Self {
        let success_count = items.iter().filter(|item| item.success).count();
        let failed_count = items.len() - success_count;
        Self {
            kind,
            items,
            success_count,
            failed_count,
            status: MutationStatus::from_counts(success_count, failed_count),
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn succeeded_ids(&self) -> Vec<EntityId> {
        self.items
            .iter()
            .filter(|item| item.success)
            .filter_map(|item| item.id.clone())
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<EntityId> {
        self.items
            .iter()
            .filter(|item| !item.success)
            .filter_map(|item| item.id.clone())
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = (usize, &SyncError)> {
        self.items
            .iter()
            .filter_map(|item| item.error.as_ref().map(|error| (item.index, error)))
    }

    /// Escalates a partial or failed run to `ConflictOrPartialFailure`.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            MutationStatus::Partial | MutationStatus::Failed => {
                Err(SyncError::ConflictOrPartialFailure {
                    succeeded: self.success_count,
                    failed: self.failed_count,
                })
            }
            _ => Ok(self),
        }
    }
}

impl<E: Entity> MutationCoordinator<E> {
    pub async fn bulk_create(&self, drafts: Vec<E::Draft>) -> Result<BulkOutcome> {
        let items = drafts.into_iter().map(|draft| (None, draft)).collect();
        self.run_bulk(MutationKind::BulkCreate, items, None, |draft| async move {
            self.create_one(draft).await.map(|created| created.id().clone())
        })
        .await
    }

    /// Applies each patch to its id, one after another. Ids that succeed are
    /// removed from `selection`.
    pub async fn bulk_update(
        &self,
        patches: Vec<(EntityId, E::Patch)>,
        selection: Option<&mut SelectionManager<E>>,
    ) -> Result<BulkOutcome> {
        let items = patches
            .into_iter()
            .map(|(id, patch)| (Some(id.clone()), (id, patch)))
            .collect();
        self.run_bulk(MutationKind::BulkUpdate, items, selection, |(id, patch)| async move {
            self.update_one(&id, patch).await.map(|updated| updated.id().clone())
        })
        .await
    }

    pub async fn bulk_delete(
        &self,
        ids: &[EntityId],
        selection: Option<&mut SelectionManager<E>>,
    ) -> Result<BulkOutcome> {
        let items = ids.iter().map(|id| (Some(id.clone()), id.clone())).collect();
        self.run_bulk(MutationKind::BulkDelete, items, selection, |id| async move {
            let result = self.delete_one(&id).await;
            result.map(|()| id)
        })
        .await
    }

    /// Applies the same patch to every selected entity.
    pub async fn bulk_update_selected(
        &self,
        selection: &mut SelectionManager<E>,
        patch: E::Patch,
    ) -> Result<BulkOutcome> {
        let patches = selection
            .selected_ids()
            .into_iter()
            .map(|id| (id, patch.clone()))
            .collect();
        self.bulk_update(patches, Some(selection)).await
    }

    pub async fn bulk_delete_selected(
        &self,
        selection: &mut SelectionManager<E>,
    ) -> Result<BulkOutcome> {
        let ids = selection.selected_ids();
        self.bulk_delete(&ids, Some(selection)).await
    }

    async fn run_bulk<T, F, Fut>(
        &self,
        kind: MutationKind,
        items: Vec<(Option<EntityId>, T)>,
        selection: Option<&mut SelectionManager<E>>,
        mut operation: F,
    ) -> Result<BulkOutcome>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<EntityId>>,
    {
        let span = info_span!(
            "mutation.bulk",
            kind = %kind,
            entity_type = E::entity_type(),
            items = items.len()
        );
        async move {
            if let Err(err) = self.bulk_preflight() {
                self.notifier.notify(Notification::error(
                    err.title(),
                    format!(
                        "Could not {} {}: {}",
                        kind.infinitive(),
                        self.config.plural_label(2),
                        err
                    ),
                ));
                return Err(err);
            }

            let targets = items.iter().filter_map(|(id, _)| id.clone()).collect();
            let flight = self.log.begin(kind, targets, format!("{} items", items.len()));

            let mut results = Vec::with_capacity(items.len());
            for (index, (target, input)) in items.into_iter().enumerate() {
                match operation(input).await {
                    Ok(id) => results.push(BulkItemResult {
                        index,
                        id: Some(id),
                        success: true,
                        error: None,
                    }),
                    Err(error) => {
                        event!(Level::WARN, index, error = %error, "bulk item failed");
                        results.push(BulkItemResult {
                            index,
                            id: target,
                            success: false,
                            error: Some(error),
                        });
                    }
                }
            }

            let outcome = BulkOutcome::from_items(kind, results);
            if let Some(selection) = selection {
                selection.deselect_ids(&outcome.succeeded_ids());
            }
            flight.finish(outcome.status);
            event!(
                Level::INFO,
                succeeded = outcome.success_count,
                failed = outcome.failed_count,
                "bulk run finished"
            );
            self.notify_bulk(&outcome);
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    fn bulk_preflight(&self) -> Result<()> {
        if !self.config.enable_bulk {
            return Err(SyncError::OperationDisabled(format!(
                "bulk operations are not enabled for {}",
                self.config.plural_label(2)
            )));
        }
        self.stamp().map(|_| ())
    }

    fn notify_bulk(&self, outcome: &BulkOutcome) {
        let kind = outcome.kind;
        let succeeded = outcome.success_count;
        let failed = outcome.failed_count;
        let notification = match outcome.status {
            MutationStatus::Succeeded if outcome.total() == 0 => Notification::new(
                "Nothing to do",
                format!(
                    "No {} to {}.",
                    self.config.plural_label(2),
                    kind.infinitive()
                ),
                Severity::Info,
            ),
            MutationStatus::Succeeded => Notification::success(
                format!(
                    "{} {}",
                    capitalize(&self.config.plural_label(succeeded)),
                    kind.verb()
                ),
                format!(
                    "{} {} {}.",
                    succeeded,
                    self.config.plural_label(succeeded),
                    kind.verb()
                ),
            ),
            MutationStatus::Partial => Notification::warning(
                "Partial success",
                format!(
                    "{} {} {}, {} failed.",
                    succeeded,
                    self.config.plural_label(succeeded),
                    kind.verb(),
                    failed
                ),
            ),
            MutationStatus::Failed | MutationStatus::Pending => {
                let reason = outcome
                    .errors()
                    .next()
                    .map(|(_, error)| error.to_string())
                    .unwrap_or_default();
                Notification::error(
                    format!("Bulk {} failed", kind.infinitive()),
                    format!(
                        "Could not {} {} {}. {}",
                        kind.infinitive(),
                        failed,
                        self.config.plural_label(failed),
                        reason
                    ),
                )
            }
        };
        self.notifier.notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CollectionKey, EntityCache};
    use crate::config::{ActionsConfig, SelectionConfig};
    use crate::core::{Record, RecordFields, Value};
    use crate::notify::RecordingNotifier;
    use crate::repository::MemoryRepository;
    use crate::session::{Actor, Session};
    use std::sync::Arc;

    fn rows() -> Vec<Record> {
        (1..=4)
            .map(|n| Record::new(n.to_string()).with("name", format!("Company {}", n)))
            .collect()
    }

    fn coordinator(
        repo: Arc<MemoryRepository<Record>>,
        notifier: Arc<RecordingNotifier>,
        config: ActionsConfig,
    ) -> MutationCoordinator<Record> {
        let cache = Arc::new(EntityCache::new());
        cache
            .set(&CollectionKey::new("record"), repo.rows().unwrap())
            .unwrap();
        MutationCoordinator::<Record>::new(
            repo,
            cache,
            Arc::new(Session::signed_in(Actor::new("u1", "Uma"))),
            notifier,
            config,
        )
    }

    #[tokio::test]
    async fn disabled_bulk_refuses_before_any_call() {
        let repo = Arc::new(MemoryRepository::with_rows(rows()));
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(repo.clone(), notifier.clone(), ActionsConfig::new("company"));

        let result = coordinator.bulk_delete(&[EntityId::from("1")], None).await;
        assert!(matches!(result, Err(SyncError::OperationDisabled(_))));
        assert_eq!(repo.calls(), 0);
        assert_eq!(notifier.len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_leaves_selection_intact() {
        let repo = Arc::new(MemoryRepository::with_rows(rows()));
        repo.set_offline(true).unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(
            repo.clone(),
            notifier.clone(),
            ActionsConfig::new("company").enable_bulk(true),
        );
        let mut selection = SelectionManager::<Record>::new(SelectionConfig::default());
        selection.set_collection(Arc::new(rows()));
        selection.select_all(&rows(), true);

        let outcome = coordinator
            .bulk_delete_selected(&mut selection)
            .await
            .unwrap();
        assert_eq!(outcome.status, MutationStatus::Failed);
        assert_eq!(outcome.failed_count, 4);
        assert_eq!(selection.selection_count(), 4);
        assert_eq!(
            outcome.clone().into_result(),
            Err(SyncError::ConflictOrPartialFailure {
                succeeded: 0,
                failed: 4
            })
        );

        let notes = notifier.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn bulk_create_reports_assigned_ids() {
        let repo = Arc::new(MemoryRepository::<Record>::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(
            repo.clone(),
            notifier.clone(),
            ActionsConfig::new("company").enable_bulk(true),
        );
        let drafts: Vec<RecordFields> = ["Acme", "Beta"]
            .iter()
            .map(|name| {
                let mut draft = RecordFields::new();
                draft.insert("name".into(), Value::from(*name));
                draft
            })
            .collect();

        let outcome = coordinator.bulk_create(drafts).await.unwrap();
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.succeeded_ids().len(), 2);
        assert_eq!(repo.rows().unwrap().len(), 2);
        assert_eq!(notifier.notifications()[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn empty_batch_is_an_informational_no_op() {
        let repo = Arc::new(MemoryRepository::with_rows(rows()));
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = coordinator(
            repo.clone(),
            notifier.clone(),
            ActionsConfig::new("company").enable_bulk(true),
        );
        let outcome = coordinator.bulk_delete(&[], None).await.unwrap();
        assert_eq!(outcome.status, MutationStatus::Succeeded);
        assert_eq!(repo.calls(), 0);
        assert_eq!(notifier.notifications()[0].severity, Severity::Info);
    }
}
