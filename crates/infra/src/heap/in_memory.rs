use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{Heap, HeapError};

/// In-memory heap for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryHeap {
    buckets: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl InMemoryHeap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Heap for InMemoryHeap {
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), HeapError> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| HeapError::Storage("lock poisoned".to_string()))?;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, HeapError> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| HeapError::Storage("lock poisoned".to_string()))?;
        buckets
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| HeapError::key_not_found(bucket, key))
    }

    fn get_all(&self, bucket: &str) -> Result<BTreeMap<String, Vec<u8>>, HeapError> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| HeapError::Storage("lock poisoned".to_string()))?;
        Ok(buckets
            .get(bucket)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let heap = InMemoryHeap::new();
        heap.put("b", "k", b"1").unwrap();
        heap.put("b", "k", b"2").unwrap();
        assert_eq!(heap.get("b", "k").unwrap(), b"2".to_vec());
    }

    #[test]
    fn buckets_are_isolated() {
        let heap = InMemoryHeap::new();
        heap.put("left", "k", b"l").unwrap();
        heap.put("right", "k", b"r").unwrap();

        assert_eq!(heap.get("left", "k").unwrap(), b"l".to_vec());
        assert_eq!(heap.get_all("right").unwrap().len(), 1);
    }

    #[test]
    fn missing_key_and_bucket() {
        let heap = InMemoryHeap::new();
        assert_eq!(
            heap.get("nope", "k"),
            Err(HeapError::key_not_found("nope", "k"))
        );
        assert!(heap.get_all("nope").unwrap().is_empty());
    }
}
