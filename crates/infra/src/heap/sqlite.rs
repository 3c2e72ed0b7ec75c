//! SQLite-backed heap.
//!
//! File-based durable storage; one table keyed by `(bucket, key)`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{Heap, HeapError};

impl From<rusqlite::Error> for HeapError {
    fn from(value: rusqlite::Error) -> Self {
        HeapError::Storage(value.to_string())
    }
}

pub struct SqliteHeap {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHeap").finish_non_exhaustive()
    }
}

impl SqliteHeap {
    /// Open (or create) a heap database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HeapError> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory SQLite heap (for testing)
    pub fn in_memory() -> Result<Self, HeapError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HeapError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS heap (
                bucket TEXT NOT NULL,
                key    TEXT NOT NULL,
                value  BLOB NOT NULL,
                PRIMARY KEY (bucket, key)
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, HeapError> {
        self.conn
            .lock()
            .map_err(|_| HeapError::Storage("lock poisoned".to_string()))
    }
}

impl Heap for SqliteHeap {
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), HeapError> {
        self.conn()?.execute(
            "INSERT INTO heap (bucket, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value",
            params![bucket, key, value],
        )?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, HeapError> {
        self.conn()?
            .query_row(
                "SELECT value FROM heap WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or_else(|| HeapError::key_not_found(bucket, key))
    }

    fn get_all(&self, bucket: &str) -> Result<BTreeMap<String, Vec<u8>>, HeapError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM heap WHERE bucket = ?1")?;
        let rows = stmt.query_map(params![bucket], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_read_back() {
        let heap = SqliteHeap::in_memory().unwrap();
        heap.put("bucket", "a", b"1").unwrap();
        heap.put("bucket", "a", b"2").unwrap();
        heap.put("bucket", "b", b"3").unwrap();
        heap.put("other", "a", b"x").unwrap();

        assert_eq!(heap.get("bucket", "a").unwrap(), b"2".to_vec());
        let all = heap.get_all("bucket").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("b"), Some(&b"3".to_vec()));
    }

    #[test]
    fn missing_key_is_reported() {
        let heap = SqliteHeap::in_memory().unwrap();
        assert_eq!(
            heap.get("bucket", "nope"),
            Err(HeapError::key_not_found("bucket", "nope"))
        );
        assert!(heap.get_all("empty").unwrap().is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heap.db");
        {
            let heap = SqliteHeap::open(&path).unwrap();
            heap.put("bucket", "k", b"persisted").unwrap();
        }
        let heap = SqliteHeap::open(&path).unwrap();
        assert_eq!(heap.get("bucket", "k").unwrap(), b"persisted".to_vec());
    }
}
