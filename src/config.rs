use crate::core::{Result, SyncError};
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_STATE_DIR: &str = "CRMSYNC_STATE_DIR";
pub const ENV_PAGE_SIZE: &str = "CRMSYNC_PAGE_SIZE";
pub const ENV_MAX_SELECTION: &str = "CRMSYNC_MAX_SELECTION";
pub const ENV_SOFT_DELETE: &str = "CRMSYNC_SOFT_DELETE";
pub const ENV_ENABLE_BULK: &str = "CRMSYNC_ENABLE_BULK";

/// Application-wide configuration for a [`Workspace`](crate::Workspace).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Directory for persisted filter and selection state; in-memory when unset
    pub state_dir: Option<PathBuf>,

    /// Page size used when a list does not set its own
    pub default_page_size: usize,

    /// Cap applied to every selection created by the workspace
    pub max_selection: Option<usize>,

    /// Default delete mode for new coordinators
    pub soft_delete: bool,

    /// Default bulk switch for new coordinators
    pub enable_bulk: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            state_dir: None,
            default_page_size: 25,
            max_selection: None,
            soft_delete: false,
            enable_bulk: false,
        }
    }

    /// Reads configuration from `CRMSYNC_*` environment variables, falling
    /// back to the defaults of [`SyncConfig::new`] for unset ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new();
        let state_dir = lookup(ENV_STATE_DIR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let default_page_size = parse_or(&lookup, ENV_PAGE_SIZE, defaults.default_page_size)?;
        if default_page_size == 0 {
            return Err(SyncError::Configuration(format!(
                "{} must be greater than zero",
                ENV_PAGE_SIZE
            )));
        }

        let max_selection = match lookup(ENV_MAX_SELECTION) {
            Some(raw) if !raw.trim().is_empty() => Some(parse_value(ENV_MAX_SELECTION, &raw)?),
            _ => None,
        };

        Ok(Self {
            state_dir,
            default_page_size,
            max_selection,
            soft_delete: parse_or(&lookup, ENV_SOFT_DELETE, defaults.soft_delete)?,
            enable_bulk: parse_or(&lookup, ENV_ENABLE_BULK, defaults.enable_bulk)?,
        })
    }

    /// Set the state directory
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Set the default page size
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Set the selection cap
    pub fn max_selection(mut self, max: usize) -> Self {
        self.max_selection = Some(max);
        self
    }

    /// Enable or disable soft delete
    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    /// Enable or disable bulk operations
    pub fn enable_bulk(mut self, enabled: bool) -> Self {
        self.enable_bulk = enabled;
        self
    }

    /// Derives the per-entity action settings.
    pub fn actions(&self, entity_label: impl Into<String>) -> ActionsConfig {
        ActionsConfig::new(entity_label)
            .soft_delete(self.soft_delete)
            .enable_bulk(self.enable_bulk)
    }

    /// Derives selection settings, persisted under `persistence_key` if given.
    pub fn selection(&self, persistence_key: Option<&str>) -> SelectionConfig {
        SelectionConfig {
            max_selection: self.max_selection,
            auto_reconcile: true,
            persistence_key: persistence_key.map(str::to_string),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        SyncError::Configuration(format!("{} has an invalid value '{}'", key, raw))
    })
}

/// Settings of one [`MutationCoordinator`](crate::MutationCoordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionsConfig {
    /// Human name of the entity used in notifications ("contact")
    pub entity_label: String,

    /// Delete stamps `deleted_at` instead of removing the row
    pub soft_delete: bool,

    /// Bulk operations refuse to run unless this is set
    pub enable_bulk: bool,

    /// Emit notifications for successful single-item operations
    pub notify_success: bool,
}

impl ActionsConfig {
    pub fn new(entity_label: impl Into<String>) -> Self {
        Self {
            entity_label: entity_label.into(),
            soft_delete: false,
            enable_bulk: false,
            notify_success: true,
        }
    }

    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    pub fn enable_bulk(mut self, enabled: bool) -> Self {
        self.enable_bulk = enabled;
        self
    }

    pub fn notify_success(mut self, enabled: bool) -> Self {
        self.notify_success = enabled;
        self
    }

    pub(crate) fn plural_label(&self, count: usize) -> String {
        if count == 1 {
            self.entity_label.clone()
        } else {
            format!("{}s", self.entity_label)
        }
    }
}

/// Settings of one [`SelectionManager`](crate::SelectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Selecting beyond this many ids is a no-op
    pub max_selection: Option<usize>,

    /// Drop selected ids that vanish from the collection
    pub auto_reconcile: bool,

    /// State-store key for the selected id array
    pub persistence_key: Option<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_selection: None,
            auto_reconcile: true,
            persistence_key: None,
        }
    }
}

impl SelectionConfig {
    pub fn max_selection(mut self, max: usize) -> Self {
        self.max_selection = Some(max);
        self
    }

    pub fn auto_reconcile(mut self, enabled: bool) -> Self {
        self.auto_reconcile = enabled;
        self
    }

    pub fn persistence_key(mut self, key: impl Into<String>) -> Self {
        self.persistence_key = Some(key.into());
        self
    }
}
