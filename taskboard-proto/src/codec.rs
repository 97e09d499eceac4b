//! Postcard encoding for persisted task-list caches.
//!
//! The sync core keeps its last authoritative snapshot in memory; the binary
//! writes it to disk between runs so a later session can fall back to it
//! when the store cannot be reached.

use serde::{Deserialize, Serialize};

use crate::query::TaskQuery;
use crate::task::Task;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A task list together with the query it was filled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTaskList {
    /// Query whose results these are.
    pub scope: TaskQuery,
    /// When the list was last refreshed from the store (epoch ms).
    pub refreshed_at: u64,
    /// Tasks in store order.
    pub tasks: Vec<Task>,
}

/// Encodes a [`CachedTaskList`] using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the list cannot be serialized.
pub fn encode(list: &CachedTaskList) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(list).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`CachedTaskList`] from a byte slice.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode(bytes: &[u8]) -> Result<CachedTaskList, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
