//! Draft state of a single record form.

use crate::actions::MutationCoordinator;
use crate::core::{Entity, EntityId, Result, SyncError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(EntityId),
}

/// Editable draft with dirty and validity tracking.
///
/// Submitting goes through a [`MutationCoordinator`], so the form shares
/// its notifications and cache writes. The auto-save deadline belongs to
/// this form only and is dropped on reset or successful submit.
#[derive(Debug)]
pub struct FormState<E: Entity> {
    mode: FormMode,
    baseline: E::Draft,
    draft: E::Draft,
    validation_error: Option<SyncError>,
    submitting: bool,
    autosave_delay: Option<Duration>,
    autosave_deadline: Option<Instant>,
}

impl<E: Entity> FormState<E> {
    pub fn for_create(initial: E::Draft) -> Self {
        Self::with_mode(FormMode::Create, initial)
    }

    pub fn for_edit(entity: &E) -> Self {
        Self::with_mode(FormMode::Edit(entity.id().clone()), entity.to_draft())
    }

    fn with_mode(mode: FormMode, baseline: E::Draft) -> Self {
        Self {
            mode,
            draft: baseline.clone(),
            baseline,
            validation_error: None,
            submitting: false,
            autosave_delay: None,
            autosave_deadline: None,
        }
    }

    /// Edits re-arm a save `delay` after the last change.
    pub fn enable_autosave(&mut self, delay: Duration) {
        self.autosave_delay = Some(delay);
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn draft(&self) -> &E::Draft {
        &self.draft
    }

    pub fn edit<F>(&mut self, change: F)
    where
        F: FnOnce(&mut E::Draft),
    {
        change(&mut self.draft);
        self.after_edit();
    }

    pub fn set_draft(&mut self, draft: E::Draft) {
        self.draft = draft;
        self.after_edit();
    }

    fn after_edit(&mut self) {
        self.validation_error = E::validate_draft(&self.draft).err();
        self.autosave_deadline = self.autosave_delay.map(|delay| Instant::now() + delay);
    }

    pub fn is_dirty(&self) -> bool {
        self.draft != self.baseline
    }

    pub fn validation_error(&self) -> Option<&SyncError> {
        self.validation_error.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.validation_error.is_none()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave_deadline
    }

    /// Drops unsaved edits and the pending auto-save.
    pub fn reset(&mut self) {
        self.draft = self.baseline.clone();
        self.validation_error = None;
        self.autosave_deadline = None;
    }

    pub fn autosave_due(&self, now: Instant) -> bool {
        self.autosave_deadline.is_some_and(|deadline| now >= deadline)
            && self.is_dirty()
            && self.is_valid()
            && !self.submitting
    }

    /// Submits when the auto-save deadline has passed.
    pub async fn autosave_if_due(
        &mut self,
        coordinator: &MutationCoordinator<E>,
        now: Instant,
    ) -> Option<Result<E>> {
        if !self.autosave_due(now) {
            return None;
        }
        debug!(entity_type = E::entity_type(), "auto-saving form");
        Some(self.submit(coordinator).await)
    }

    /// Creates or updates the record. On success the saved values become the
    /// new baseline and a create form switches to editing the new record.
    pub async fn submit(&mut self, coordinator: &MutationCoordinator<E>) -> Result<E> {
        self.submitting = true;
        let draft = self.draft.clone();
        let result = match &self.mode {
            FormMode::Create => coordinator.create(draft).await,
            FormMode::Edit(id) => coordinator.update(id, E::patch_from_draft(draft)).await,
        };
        self.submitting = false;

        match &result {
            Ok(saved) => {
                self.mode = FormMode::Edit(saved.id().clone());
                self.baseline = saved.to_draft();
                self.draft = self.baseline.clone();
                self.validation_error = None;
                self.autosave_deadline = None;
            }
            Err(err) if matches!(err, SyncError::ValidationFailed(_)) => {
                self.validation_error = Some(err.clone());
            }
            Err(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Record, RecordFields, Value};

    #[test]
    fn edits_track_dirtiness_and_validity() {
        let record = Record::new("1").with("name", "Acme");
        let mut form = FormState::for_edit(&record);
        assert!(!form.is_dirty());

        form.edit(|draft| {
            draft.insert("name".into(), Value::from("Acme Ltd"));
        });
        assert!(form.is_dirty());
        assert!(form.is_valid());

        form.edit(|draft| {
            draft.insert("id".into(), Value::from("2"));
        });
        assert!(!form.is_valid());

        form.reset();
        assert!(!form.is_dirty());
        assert!(form.is_valid());
    }

    #[test]
    fn autosave_waits_for_the_deadline_and_reset_clears_it() {
        let mut form = FormState::<Record>::for_create(RecordFields::new());
        form.enable_autosave(Duration::from_millis(500));
        form.edit(|draft| {
            draft.insert("name".into(), Value::from("Beta"));
        });

        let deadline = form.autosave_deadline().expect("armed by the edit");
        assert!(!form.autosave_due(deadline - Duration::from_millis(1)));
        assert!(form.autosave_due(deadline));

        form.reset();
        assert!(form.autosave_deadline().is_none());
        assert!(!form.autosave_due(deadline + Duration::from_secs(1)));
    }
}
