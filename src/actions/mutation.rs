use crate::core::EntityId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{Level, event};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Restore,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
}

impl MutationKind {
    pub fn is_bulk(self) -> bool {
        matches!(self, Self::BulkCreate | Self::BulkUpdate | Self::BulkDelete)
    }

    /// Past-tense verb used in notifications.
    pub(crate) fn verb(self) -> &'static str {
        match self {
            Self::Create | Self::BulkCreate => "created",
            Self::Update | Self::BulkUpdate => "updated",
            Self::Delete | Self::BulkDelete => "deleted",
            Self::Restore => "restored",
        }
    }

    pub(crate) fn infinitive(self) -> &'static str {
        match self {
            Self::Create | Self::BulkCreate => "create",
            Self::Update | Self::BulkUpdate => "update",
            Self::Delete | Self::BulkDelete => "delete",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Restore => "restore",
            Self::BulkCreate => "bulk_create",
            Self::BulkUpdate => "bulk_update",
            Self::BulkDelete => "bulk_delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Succeeded,
    Failed,
    Partial,
}

impl MutationStatus {
    /// Aggregate status of a batch.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Self::Succeeded,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

/// An operation between dispatch and notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRecord {
    pub id: Uuid,
    pub kind: MutationKind,
    pub targets: Vec<EntityId>,
    /// Debug rendering of the payload.
    pub payload: String,
    pub status: MutationStatus,
    pub started_at: DateTime<Utc>,
}

/// Records of the mutations currently in flight.
#[derive(Debug, Default)]
pub(crate) struct MutationLog {
    records: Mutex<HashMap<Uuid, MutationRecord>>,
}

impl MutationLog {
    pub(crate) fn begin(
        &self,
        kind: MutationKind,
        targets: Vec<EntityId>,
        payload: String,
    ) -> InFlight<'_> {
        let record = MutationRecord {
            id: Uuid::new_v4(),
            kind,
            targets,
            payload,
            status: MutationStatus::Pending,
            started_at: Utc::now(),
        };
        let id = record.id;
        if let Ok(mut records) = self.records.lock() {
            records.insert(id, record);
        }
        InFlight { log: self, id }
    }

    pub(crate) fn pending(&self) -> Vec<MutationRecord> {
        let mut pending: Vec<MutationRecord> = self
            .records
            .lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        pending.sort_by_key(|record| record.started_at);
        pending
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records
            .lock()
            .map(|records| records.is_empty())
            .unwrap_or(true)
    }

    fn discard(&self, id: &Uuid) -> Option<MutationRecord> {
        self.records.lock().ok().and_then(|mut records| records.remove(id))
    }
}

/// Removes its record when dropped, also when the call is abandoned.
pub(crate) struct InFlight<'a> {
    log: &'a MutationLog,
    id: Uuid,
}

impl InFlight<'_> {
    /// Logs the terminal status; the record is discarded on drop.
    pub(crate) fn finish(&self, status: MutationStatus) {
        if let Ok(mut records) = self.log.records.lock() {
            if let Some(record) = records.get_mut(&self.id) {
                record.status = status;
                event!(
                    Level::DEBUG,
                    mutation = %record.id,
                    kind = %record.kind,
                    ?status,
                    "mutation finished"
                );
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.log.discard(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_status_follows_counts() {
        assert_eq!(MutationStatus::from_counts(4, 0), MutationStatus::Succeeded);
        assert_eq!(MutationStatus::from_counts(4, 1), MutationStatus::Partial);
        assert_eq!(MutationStatus::from_counts(0, 5), MutationStatus::Failed);
    }

    #[test]
    fn records_live_until_the_guard_drops() {
        let log = MutationLog::default();
        {
            let guard = log.begin(MutationKind::Update, vec!["1".into()], "{}".into());
            assert_eq!(log.pending().len(), 1);
            assert_eq!(log.pending()[0].status, MutationStatus::Pending);
            guard.finish(MutationStatus::Succeeded);
            assert_eq!(log.pending()[0].status, MutationStatus::Succeeded);
        }
        assert!(log.is_empty());
    }
}
