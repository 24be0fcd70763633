// ============================================================================
// crmsync: client-side entity state for CRM applications
// ============================================================================

pub mod core;
pub mod config;
pub mod session;
pub mod notify;
pub mod storage;
pub mod repository;
pub mod cache;
pub mod filter;
pub mod selection;
pub mod actions;
pub mod list;
pub mod form;
pub mod crm;
pub mod workspace;

// Re-export main types for convenience
pub use core::{
    AuditStamp, Entity, EntityId, EntityMetadata, Record, RecordFields, Result, SyncError, Value,
};
pub use config::{ActionsConfig, SelectionConfig, SyncConfig};
pub use session::{Actor, Session, SessionProvider};
pub use notify::{BroadcastNotifier, Notification, Notifier, RecordingNotifier, Severity, TracingNotifier};
pub use storage::{FileStateStore, MemoryStateStore, StateStore};

// ============================================================================
// Data access and caching
// ============================================================================

pub use repository::{ListQuery, MemoryRepository, OverrideRepository, QueryCapabilities, Repository};
pub use cache::{CacheRead, CacheSnapshot, CollectionKey, EntityCache, KeyPattern};

// ============================================================================
// View state: filters, selection, lists and forms
// ============================================================================

pub use filter::{FacetCount, FilterEngine, FilterPreset, FilterState, FilterValue, FilterView, PageSpec, SortDirection, SortSpec};
pub use selection::{SelectionManager, SelectionSet, SelectionState};
pub use list::{EntityList, ListSnapshot};
pub use form::{FormMode, FormState};

// ============================================================================
// Mutations
// ============================================================================

pub use actions::{BulkItemResult, BulkOutcome, MutationCoordinator, MutationKind, MutationRecord, MutationStatus};

pub use workspace::Workspace;

#[doc(hidden)]
pub use paste;
