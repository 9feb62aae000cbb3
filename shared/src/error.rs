use thiserror::Error;

use crate::adapters::{StorageError, TransportError};

/// Everything that can go wrong while loading parking data.
///
/// None of these are fatal: the store keeps its previous records and exposes
/// the error so the UI can show a stale indicator and offer a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Upstream returned HTTP {0}")]
    HttpStatus(u16),
    #[error("Malformed parking payload: {0}")]
    MalformedPayload(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<TransportError> for StoreError {
    fn from(error: TransportError) -> Self {
        StoreError::Transport(error.to_string())
    }
}

impl From<StorageError> for StoreError {
    fn from(error: StorageError) -> Self {
        StoreError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::MalformedPayload(error.to_string())
    }
}
