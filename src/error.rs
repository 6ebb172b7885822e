//! Error types for the auto-assign engine.
//!
//! Every failure surfaced by the engine is an [`AutoAssignError`]. Variants are
//! grouped by [`ErrorKind`] so callers can tell a request that must be fixed
//! (validation) from one that may be retried after a delay (conflict, upstream).

use thiserror::Error;

/// Coarse classification of an [`AutoAssignError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input rejected at the boundary; never reached the store.
    Validation,
    /// Request collided with current state; retry after re-reading.
    Conflict,
    /// Unknown entry or target.
    NotFound,
    /// Metrics provider or storage failed or timed out.
    Upstream,
    /// Bug or misconfiguration inside the engine.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutoAssignError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition for entry {entry_id}: {from} -> {to}")]
    InvalidTransition {
        entry_id: i64,
        from: String,
        to: String,
    },

    #[error("Regeneration already running for {target}")]
    RegenerationInProgress { target: String },

    #[error("Freelancer {freelancer_id} already has an open entry for {target}")]
    DuplicateOpenEntry { target: String, freelancer_id: i64 },

    #[error("Entry {entry_id} was modified concurrently (now {current_status})")]
    ConcurrentModification {
        entry_id: i64,
        current_status: String,
    },

    #[error("Invitation for entry {entry_id} expired")]
    InvitationExpired { entry_id: i64 },

    #[error("Invitation for entry {entry_id} is still open")]
    InvitationStillOpen { entry_id: i64 },

    #[error("Queue entry not found: {0}")]
    EntryNotFound(i64),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Candidate metrics provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Regeneration cancelled for {target}")]
    Cancelled { target: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutoAssignError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. }
            | Self::RegenerationInProgress { .. }
            | Self::DuplicateOpenEntry { .. }
            | Self::ConcurrentModification { .. }
            | Self::InvitationExpired { .. }
            | Self::InvitationStillOpen { .. }
            | Self::Cancelled { .. } => ErrorKind::Conflict,
            Self::EntryNotFound(_) | Self::TargetNotFound(_) => ErrorKind::NotFound,
            Self::ProviderUnavailable(_) | Self::Timeout(_) | Self::Storage(_) => {
                ErrorKind::Upstream
            }
            Self::Configuration(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same request may succeed later without being changed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Upstream)
    }
}

impl From<serde_json::Error> for AutoAssignError {
    fn from(error: serde_json::Error) -> Self {
        AutoAssignError::Validation(format!("JSON serialization error: {error}"))
    }
}

impl From<sqlx::Error> for AutoAssignError {
    fn from(err: sqlx::Error) -> Self {
        AutoAssignError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutoAssignError>;
