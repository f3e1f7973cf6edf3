use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::RecordKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Internal,
}

/// Error body returned to HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure raised by a persistence adapter or an active record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record key is missing")]
    MissingKey,
    #[error("record '{0}' not found")]
    NotFound(RecordKey),
    #[error("record type does not persist itself")]
    NotSelfPersisting,
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl PersistenceError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<PersistenceError> for ApiError {
    fn from(value: PersistenceError) -> Self {
        let code = match value {
            PersistenceError::NotFound(_) => ErrorCode::NotFound,
            PersistenceError::MissingKey => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        };
        Self {
            code,
            message: value.to_string(),
        }
    }
}
