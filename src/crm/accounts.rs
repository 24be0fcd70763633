use super::{ContactStatus, check_email, check_non_negative, require_text};
use crate::core::{EntityId, Result};

crm_entity! {
    /// A company the team sells to.
    pub struct Organization: "organization" {
        name: String,
        industry: Option<String>,
        website: Option<String>,
        annual_revenue: Option<f64>,
    }
}

impl Organization {
    fn check_draft(draft: &OrganizationDraft) -> Result<()> {
        require_text("name", &draft.name)?;
        if let Some(revenue) = draft.annual_revenue {
            check_non_negative("annual revenue", revenue)?;
        }
        Ok(())
    }

    fn check_patch(patch: &OrganizationPatch) -> Result<()> {
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(Some(revenue)) = patch.annual_revenue {
            check_non_negative("annual revenue", revenue)?;
        }
        Ok(())
    }
}

crm_entity! {
    pub struct Contact: "contact" {
        first_name: String,
        last_name: String,
        email: Option<String>,
        phone: Option<String>,
        organization_id: Option<EntityId>,
        status: ContactStatus,
    }
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    fn check_draft(draft: &ContactDraft) -> Result<()> {
        require_text("first name", &draft.first_name)?;
        if let Some(email) = &draft.email {
            check_email(email)?;
        }
        Ok(())
    }

    fn check_patch(patch: &ContactPatch) -> Result<()> {
        if let Some(first_name) = &patch.first_name {
            require_text("first name", first_name)?;
        }
        if let Some(Some(email)) = &patch.email {
            check_email(email)?;
        }
        Ok(())
    }
}

impl ContactDraft {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn organization(mut self, id: EntityId) -> Self {
        self.organization_id = Some(id);
        self
    }

    pub fn status(mut self, status: ContactStatus) -> Self {
        self.status = status;
        self
    }
}

impl OrganizationDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AuditStamp, Entity, EntityMetadata, SyncError, Value};

    fn contact() -> Contact {
        Contact::from_draft(
            EntityId::new("c1"),
            ContactDraft::new("Ada", "Lovelace").email("ada@example.com"),
            EntityMetadata::stamped(&AuditStamp::new("u1")),
        )
        .unwrap()
    }

    #[test]
    fn contact_projects_fields_for_search_and_facets() {
        let contact = contact();
        assert_eq!(contact.field_value("status"), Some(Value::from("lead")));
        assert_eq!(contact.field_value("organization_id"), Some(Value::Null));
        assert_eq!(contact.full_name(), "Ada Lovelace");
    }

    #[test]
    fn invalid_email_is_rejected_before_and_after_patching() {
        let bad = ContactDraft::new("Ada", "").email("not-an-email");
        assert!(matches!(
            Contact::validate_draft(&bad),
            Err(SyncError::ValidationFailed(_))
        ));

        let mut contact = contact();
        let patch = ContactPatch {
            email: Some(Some("broken".into())),
            ..ContactPatch::default()
        };
        assert!(Contact::validate_patch(&patch).is_err());
        assert!(contact.apply_patch(&patch).is_err());
        assert_eq!(contact.email().as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn empty_patch_is_invalid() {
        assert!(Organization::validate_patch(&OrganizationPatch::default()).is_err());
        let patch = Organization::patch_from_draft(OrganizationDraft::new("Acme"));
        assert!(Organization::validate_patch(&patch).is_ok());
    }
}
