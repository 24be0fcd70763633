use crate::core::{Result, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable opaque identifier of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Text(id.0)
    }
}

/// Timestamps, soft-delete marker and audit fields carried by every entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker, `None` while the entity is alive.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    /// Incremented by the backend on every write.
    #[serde(default)]
    pub version: i64,
}

impl EntityMetadata {
    /// Creates new metadata initialized with the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: None,
            updated_by: None,
            version: 0,
        }
    }

    pub fn stamped(stamp: &AuditStamp) -> Self {
        Self {
            created_by: Some(stamp.actor.clone()),
            updated_by: Some(stamp.actor.clone()),
            ..Self::new(stamp.at)
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Records a write by `stamp`.
    pub fn touch(&mut self, stamp: &AuditStamp) {
        self.updated_at = stamp.at;
        self.updated_by = Some(stamp.actor.clone());
        self.version += 1;
    }
}

/// Who performs a write, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl AuditStamp {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            at: Utc::now(),
        }
    }
}

/// Field names that never take part in the default text search.
pub fn is_searchable_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    !(lower.contains("id") || lower.contains("_at") || lower.contains("password"))
}

/// A domain record managed by the cache, selection, filter and mutation layers.
///
/// Entities are value snapshots: every mutation produces a new clone, the
/// cache never hands out mutable access to a stored entity.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Create payload; also the editable state of a form.
    type Draft: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    /// Update payload.
    type Patch: Clone + fmt::Debug + Send + Sync + 'static;

    /// Name of the entity type, used as the first part of every collection key.
    fn entity_type() -> &'static str;

    fn id(&self) -> &EntityId;
    fn metadata(&self) -> &EntityMetadata;
    fn metadata_mut(&mut self) -> &mut EntityMetadata;

    /// Data fields of the entity (metadata excluded).
    fn fields(&self) -> Vec<(String, Value)>;

    fn from_draft(id: EntityId, draft: Self::Draft, metadata: EntityMetadata) -> Result<Self>;

    /// Applies `patch` in place and reports whether any field changed.
    fn apply_patch(&mut self, patch: &Self::Patch) -> Result<bool>;

    fn to_draft(&self) -> Self::Draft;

    /// Converts a full draft into a patch that overwrites every field.
    fn patch_from_draft(draft: Self::Draft) -> Self::Patch;

    /// Local shape check run before a create is dispatched.
    fn validate_draft(_draft: &Self::Draft) -> Result<()> {
        Ok(())
    }

    /// Local shape check run before an update is dispatched.
    fn validate_patch(_patch: &Self::Patch) -> Result<()> {
        Ok(())
    }

    /// Resolves a data field or one of the metadata columns by name.
    fn field_value(&self, name: &str) -> Option<Value> {
        let metadata = self.metadata();
        match name {
            "id" => Some(Value::Text(self.id().to_string())),
            "created_at" => Some(Value::Timestamp(metadata.created_at)),
            "updated_at" => Some(Value::Timestamp(metadata.updated_at)),
            "deleted_at" => Some(metadata.deleted_at.into()),
            "created_by" => Some(metadata.created_by.clone().into()),
            "updated_by" => Some(metadata.updated_by.clone().into()),
            _ => self
                .fields()
                .into_iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
        }
    }

    fn is_deleted(&self) -> bool {
        self.metadata().is_deleted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_surface_excludes_ids_timestamps_and_secrets() {
        assert!(is_searchable_field("name"));
        assert!(is_searchable_field("email"));
        assert!(!is_searchable_field("organization_id"));
        assert!(!is_searchable_field("Id"));
        assert!(!is_searchable_field("closed_at"));
        assert!(!is_searchable_field("password_hash"));
    }

    #[test]
    fn touch_bumps_version_and_audit_fields() {
        let created = AuditStamp::new("alice");
        let mut metadata = EntityMetadata::stamped(&created);
        assert_eq!(metadata.version, 0);

        let edit = AuditStamp::new("bob");
        metadata.touch(&edit);
        assert_eq!(metadata.version, 1);
        assert_eq!(metadata.created_by.as_deref(), Some("alice"));
        assert_eq!(metadata.updated_by.as_deref(), Some("bob"));
        assert!(!metadata.is_deleted());
    }
}
