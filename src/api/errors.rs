//! # API Error Types
//!
//! Maps engine errors onto HTTP-style status codes and stable machine-readable
//! codes. Transport adapters turn [`ApiError::body`] into their own response
//! type.

use serde_json::{json, Value};
use thiserror::Error;

use crate::error::AutoAssignError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("{message}")]
    NotFound { message: String },

    /// The request collided with current state; retry after re-reading
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("Service temporarily unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Request timeout: {message}")]
    Timeout { message: String },

    #[error("Internal server error")]
    Internal,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::ServiceUnavailable { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::Internal => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { code, .. } => code,
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether the same request may succeed later unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::ServiceUnavailable { .. } | Self::Timeout { .. }
        )
    }

    pub fn body(&self) -> Value {
        json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }
        })
    }
}

impl From<AutoAssignError> for ApiError {
    fn from(error: AutoAssignError) -> Self {
        let message = error.to_string();
        let conflict = |code| ApiError::Conflict {
            code,
            message: message.clone(),
        };
        match &error {
            AutoAssignError::Validation(detail) => ApiError::bad_request(detail.clone()),
            AutoAssignError::InvalidTransition { .. } => conflict("INVALID_TRANSITION"),
            AutoAssignError::RegenerationInProgress { .. } => conflict("REGENERATION_IN_PROGRESS"),
            AutoAssignError::DuplicateOpenEntry { .. } => conflict("DUPLICATE_OPEN_ENTRY"),
            AutoAssignError::ConcurrentModification { .. } => conflict("CONCURRENT_MODIFICATION"),
            AutoAssignError::InvitationExpired { .. } => conflict("INVITATION_EXPIRED"),
            AutoAssignError::InvitationStillOpen { .. } => conflict("INVITATION_STILL_OPEN"),
            AutoAssignError::Cancelled { .. } => conflict("REGENERATION_CANCELLED"),
            AutoAssignError::EntryNotFound(_) | AutoAssignError::TargetNotFound(_) => {
                ApiError::NotFound { message }
            }
            AutoAssignError::Timeout(_) => ApiError::Timeout { message },
            AutoAssignError::ProviderUnavailable(_) | AutoAssignError::Storage(_) => {
                ApiError::ServiceUnavailable { message }
            }
            AutoAssignError::Configuration(_) | AutoAssignError::Internal(_) => {
                tracing::error!(error = %error, "Internal error surfaced at API boundary");
                ApiError::Internal
            }
        }
    }
}
