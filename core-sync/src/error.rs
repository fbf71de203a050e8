use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Tagging failed: {0}")]
    Tagging(String),

    #[error("Ledger persistence failed: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Download attempt {id} not found")]
    AttemptNotFound { id: i64 },

    #[error("Sync engine is already running")]
    AlreadyRunning,

    #[error("Cannot {operation} while engine is {state}")]
    InvalidLifecycle { operation: String, state: String },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid source type: {0}")]
    InvalidSourceType(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        SyncError::Provider(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
