pub mod entity;
pub mod error;
pub mod record;
pub mod value;

pub use entity::{AuditStamp, Entity, EntityId, EntityMetadata, is_searchable_field};
pub use error::{Result, SyncError};
pub use record::{Record, RecordFields};
pub use value::Value;
