use super::{InteractionKind, require_text};
use crate::core::{EntityId, Result};
use chrono::{DateTime, Utc};

crm_entity! {
    /// A logged call, email, meeting or note.
    pub struct Interaction: "interaction" {
        kind: InteractionKind,
        subject: String,
        notes: Option<String>,
        contact_id: Option<EntityId>,
        occurred_at: DateTime<Utc>,
    }
}

impl Interaction {
    fn check_draft(draft: &InteractionDraft) -> Result<()> {
        require_text("subject", &draft.subject)
    }

    fn check_patch(patch: &InteractionPatch) -> Result<()> {
        match &patch.subject {
            Some(subject) => require_text("subject", subject),
            None => Ok(()),
        }
    }
}

impl InteractionDraft {
    pub fn new(kind: InteractionKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            notes: None,
            contact_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_contact(mut self, contact_id: EntityId) -> Self {
        self.contact_id = Some(contact_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Entity;

    #[test]
    fn subject_is_required_and_timestamps_are_not_searchable() {
        assert!(Interaction::validate_draft(&InteractionDraft::new(InteractionKind::Call, " ")).is_err());

        let draft = InteractionDraft::new(InteractionKind::Meeting, "Kick-off");
        let searchable: Vec<&str> = ["kind", "subject", "notes", "contact_id", "occurred_at"]
            .into_iter()
            .filter(|field| crate::core::is_searchable_field(field))
            .collect();
        assert_eq!(searchable, vec!["kind", "subject", "notes"]);
        assert!(Interaction::validate_draft(&draft).is_ok());
    }
}
