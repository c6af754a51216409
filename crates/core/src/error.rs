//! Error types for the core library

use thiserror::Error;

use crate::resource::{ResourceId, ResourceKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed {kind} resource: {reason}")]
    MalformedResource { kind: ResourceKind, reason: String },

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Unknown preference field: {0}")]
    UnknownPreferenceField(String),

    #[error("Invalid preference value for {field}: {value}")]
    InvalidPreferenceValue { field: String, value: String },

    #[error("Card not found: {0}")]
    CardNotFound(ResourceId),

    #[error("Task {task_id} not found in card {card_id}")]
    TaskNotFound {
        card_id: ResourceId,
        task_id: ResourceId,
    },

    #[error("Task index {index} out of range for card {card_id} ({len} tasks)")]
    TaskIndexOutOfRange {
        card_id: ResourceId,
        index: usize,
        len: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A sync is already in progress")]
    SyncInProgress,

    #[error("There are local changes that have not been synced")]
    PendingChanges,

    #[error("Sync timed out after {seconds} seconds")]
    SyncTimedOut { seconds: u64 },

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Create a MalformedResource error
    pub fn malformed(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self::MalformedResource {
            kind,
            reason: reason.into(),
        }
    }
}
