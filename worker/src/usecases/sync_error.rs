use serde_json::Value;
use thiserror::Error;

/// Failure taxonomy shared by every use case. The HTTP layer maps each variant to a
/// status code; the worker loop only logs and counts them.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{message}")]
    Conflict { message: String, current: Value },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("upstream call failed: {0:#}")]
    Upstream(anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>, current: Value) -> Self {
        SyncError::Conflict {
            message: message.into(),
            current,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
