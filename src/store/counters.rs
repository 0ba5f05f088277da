use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;

use super::Store;
use crate::error::StorageError;

/// A persisted named counter
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct Counter {
    pub name: String,
    pub value: i64,
    pub created_at: String,
}

/// Keyed storage able to add a delta to a counter, creating it if absent.
/// The upsert does not have to return the resulting value.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    async fn upsert_add(&self, name: &str, delta: i64) -> Result<()>;
    async fn value_of(&self, name: &str) -> Result<i64>;
    /// Highest values first
    async fn tops(&self, limit: usize) -> Result<Vec<Counter>>;
    /// Lowest values first
    async fn flops(&self, limit: usize) -> Result<Vec<Counter>>;
}

/// Counters kept in the `plusplus` table
#[derive(Clone)]
pub struct SqliteCounters {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCounters {
    pub fn new(store: &Store) -> Self {
        Self {
            conn: store.connection(),
        }
    }

    fn query_ordered(conn: &Connection, order: &str, limit: usize) -> Result<Vec<Counter>> {
        let sql = format!(
            "SELECT name, value, created_at FROM plusplus ORDER BY value {}, name ASC LIMIT ?1",
            order
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;
        let counters = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(Counter {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to map rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect rows")?;
        Ok(counters)
    }
}

#[async_trait]
impl CounterBackend for SqliteCounters {
    async fn upsert_add(&self, name: &str, delta: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO plusplus (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = plusplus.value + excluded.value",
            rusqlite::params![name, delta],
        )
        .context("Failed to upsert counter")?;
        Ok(())
    }

    async fn value_of(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT value FROM plusplus WHERE name = ?1",
            rusqlite::params![name],
            |row| row.get(0),
        )
        .context("Failed to read counter")
    }

    async fn tops(&self, limit: usize) -> Result<Vec<Counter>> {
        let conn = self.conn.lock().await;
        Self::query_ordered(&conn, "DESC", limit)
    }

    async fn flops(&self, limit: usize) -> Result<Vec<Counter>> {
        let conn = self.conn.lock().await;
        Self::query_ordered(&conn, "ASC", limit)
    }
}

/// Race-safe counter increments.
///
/// The backend's upsert and read-back are two separate steps, so a
/// store-wide critical section covers both; the returned value is the one
/// produced by this very increment even under concurrent callers.
pub struct CounterStore {
    backend: Arc<dyn CounterBackend>,
    lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(backend: Arc<dyn CounterBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    /// Add `delta` to the counter `name` and return its new value
    pub async fn increment(&self, name: &str, delta: i64) -> Result<i64, StorageError> {
        let _guard = self.lock.lock().await;

        self.backend
            .upsert_add(name, delta)
            .await
            .map_err(|e| StorageError::new(format!("increment {:?}", name), e))?;

        let value = self
            .backend
            .value_of(name)
            .await
            .map_err(|e| StorageError::new(format!("read back {:?}", name), e))?;

        debug!("Counter {} {:+} -> {}", name, delta, value);
        Ok(value)
    }

    pub async fn tops(&self, limit: usize) -> Result<Vec<Counter>, StorageError> {
        self.backend
            .tops(limit)
            .await
            .map_err(|e| StorageError::new("list top counters", e))
    }

    pub async fn flops(&self, limit: usize) -> Result<Vec<Counter>, StorageError> {
        self.backend
            .flops(limit)
            .await
            .map_err(|e| StorageError::new("list flop counters", e))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::UnreachableCounters;
    use super::*;
    use std::collections::BTreeSet;

    fn sqlite_store() -> CounterStore {
        let store = Store::open_in_memory().unwrap();
        CounterStore::new(Arc::new(SqliteCounters::new(&store)))
    }

    #[tokio::test]
    async fn test_increment_creates_and_updates() {
        let counters = sqlite_store();
        assert_eq!(counters.increment("coffee", 1).await.unwrap(), 1);
        assert_eq!(counters.increment("coffee", 2).await.unwrap(), 3);
        assert_eq!(counters.increment("tea", -1).await.unwrap(), -1);
        assert_eq!(counters.increment("tea", 0).await.unwrap(), -1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let counters = Arc::new(sqlite_store());
        let start = counters.increment("coffee", 5).await.unwrap();
        let n = 64;

        let mut handles = Vec::new();
        for _ in 0..n {
            let counters = Arc::clone(&counters);
            handles.push(tokio::spawn(async move {
                counters.increment("coffee", 1).await.unwrap()
            }));
        }

        let mut seen = BTreeSet::new();
        for handle in handles {
            seen.insert(handle.await.unwrap());
        }

        // Every caller observed the value its own increment produced
        let expected: BTreeSet<i64> = (start + 1..=start + n).collect();
        assert_eq!(seen, expected);

        let final_value = counters.increment("coffee", 0).await.unwrap();
        assert_eq!(final_value, start + n);
    }

    #[tokio::test]
    async fn test_tops_and_flops_ordering() {
        let counters = sqlite_store();
        for (name, delta) in [("a", 3), ("b", -2), ("c", 7), ("d", 0)] {
            counters.increment(name, delta).await.unwrap();
        }

        let tops: Vec<(String, i64)> = counters
            .tops(2)
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        assert_eq!(tops, vec![("c".to_string(), 7), ("a".to_string(), 3)]);

        let flops: Vec<String> = counters
            .flops(10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(flops, vec!["b", "d", "a", "c"]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_storage_error() {
        let counters = CounterStore::new(Arc::new(UnreachableCounters));
        let err = counters.increment("coffee", 1).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "storage error: increment \"coffee\": connection refused"
        );
        assert!(counters.tops(5).await.is_err());
    }
}
