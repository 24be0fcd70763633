use crate::core::{Entity, EntityId, EntityMetadata, Result, SyncError, Value};
use chrono::Utc;
use std::collections::BTreeMap;

pub type RecordFields = BTreeMap<String, Value>;

/// Untyped entity: an id, metadata and a sorted map of named values.
///
/// Used for tables that have no dedicated Rust type and as a lightweight
/// fixture in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: EntityId,
    metadata: EntityMetadata,
    values: RecordFields,
}

impl Record {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            metadata: EntityMetadata::new(Utc::now()),
            values: RecordFields::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn values(&self) -> &RecordFields {
        &self.values
    }
}

impl Entity for Record {
    type Draft = RecordFields;
    /// `Value::Null` clears a field.
    type Patch = RecordFields;

    fn entity_type() -> &'static str {
        "record"
    }

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }

    fn fields(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn from_draft(id: EntityId, draft: Self::Draft, metadata: EntityMetadata) -> Result<Self> {
        Self::validate_draft(&draft)?;
        Ok(Self {
            id,
            metadata,
            values: draft,
        })
    }

    fn apply_patch(&mut self, patch: &Self::Patch) -> Result<bool> {
        let mut changed = false;
        for (field, value) in patch {
            if value.is_null() {
                changed |= self.values.remove(field).is_some();
                continue;
            }
            if self.values.get(field) != Some(value) {
                self.values.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        Ok(changed)
    }

    fn to_draft(&self) -> Self::Draft {
        self.values.clone()
    }

    fn patch_from_draft(draft: Self::Draft) -> Self::Patch {
        draft
    }

    fn validate_draft(draft: &Self::Draft) -> Result<()> {
        validate_field_names(draft.keys())
    }

    fn validate_patch(patch: &Self::Patch) -> Result<()> {
        validate_field_names(patch.keys())
    }
}

fn validate_field_names<'a>(mut names: impl Iterator<Item = &'a String>) -> Result<()> {
    match names.find(|name| name.trim().is_empty() || is_reserved(name)) {
        Some(name) => Err(SyncError::validation(format!(
            "field name '{}' is empty or reserved",
            name
        ))),
        None => Ok(()),
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "id" | "created_at" | "updated_at" | "deleted_at" | "created_by" | "updated_by"
    )
}
