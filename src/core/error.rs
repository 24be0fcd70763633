use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("{entity_type} '{id}' not found")]
    NotFound { entity_type: String, id: String },

    #[error("Bulk operation incomplete: {succeeded} succeeded, {failed} failed")]
    ConflictOrPartialFailure { succeeded: usize, failed: usize },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Operation disabled: {0}")]
    OperationDisabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure(message.into())
    }

    /// Short, user-facing label for the error class.
    pub fn title(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired(_) => "Sign-in required",
            Self::ValidationFailed(_) => "Invalid data",
            Self::NotFound { .. } => "Not found",
            Self::ConflictOrPartialFailure { .. } => "Partially completed",
            Self::TransportFailure(_) => "Connection problem",
            Self::OperationDisabled(_) => "Not allowed",
            Self::Configuration(_) => "Configuration problem",
            Self::Storage(_) => "Storage problem",
            Self::LockError(_) => "Internal error",
        }
    }

    /// Whether the error was raised before anything was sent to the backend.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed(_)
                | Self::AuthenticationRequired(_)
                | Self::OperationDisabled(_)
                | Self::Configuration(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {err}"))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
