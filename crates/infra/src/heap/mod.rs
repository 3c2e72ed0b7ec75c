//! Keyed store ("heap") for state derived from unit output.
//!
//! Entries are grouped into named buckets so several ledgers can share one
//! backing store. Buckets are created lazily; last write wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryHeap;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHeap;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("no heap value for key '{key}' in bucket '{bucket}'")]
    KeyNotFound { bucket: String, key: String },

    #[error("heap storage error: {0}")]
    Storage(String),
}

impl HeapError {
    pub fn key_not_found(bucket: &str, key: &str) -> Self {
        Self::KeyNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

/// Bucketed key/value store.
///
/// Implementations must be safe for concurrent use.
pub trait Heap: Send + Sync {
    /// Insert or overwrite `key` in `bucket`.
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), HeapError>;

    /// Fetch a single value; `KeyNotFound` when absent.
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, HeapError>;

    /// All entries of a bucket. Unknown buckets are empty.
    fn get_all(&self, bucket: &str) -> Result<BTreeMap<String, Vec<u8>>, HeapError>;
}

impl<S> Heap for Arc<S>
where
    S: Heap + ?Sized,
{
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), HeapError> {
        (**self).put(bucket, key, value)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, HeapError> {
        (**self).get(bucket, key)
    }

    fn get_all(&self, bucket: &str) -> Result<BTreeMap<String, Vec<u8>>, HeapError> {
        (**self).get_all(bucket)
    }
}
