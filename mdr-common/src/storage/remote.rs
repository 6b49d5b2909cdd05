//! Remote record persistence

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::USER_ID_FIELD;
use crate::{Error, Result};

/// A remote row: JSON object with a `user_id` field
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Hosted per-user record store
///
/// The preference layer needs exactly three operations. Implementations map
/// transport failures to [`Error::PersistenceUnavailable`] (reads) or
/// [`Error::WriteFailed`] (writes).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the record owned by `user_id`, if any
    async fn select_one(&self, table: &str, user_id: &str) -> Result<Option<Record>>;

    /// Insert a new record; `record` must carry `user_id`
    async fn insert_one(&self, table: &str, record: Record) -> Result<()>;

    /// Merge `partial` into the record owned by `user_id`
    async fn update_one(&self, table: &str, user_id: &str, partial: Record) -> Result<()>;
}

pub(crate) fn record_user_id(record: &Record) -> Result<String> {
    record
        .get(USER_ID_FIELD)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput("record is missing user_id".to_string()))
}

/// In-process remote store
///
/// Supports failure injection and holding writes, so callers can observe
/// state while remote persistence is still in flight.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<HashMap<(String, String), Record>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_gate: Arc<RwLock<()>>,
    selects: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Block all writes until the returned guard is dropped
    ///
    /// Returns None if writes are already held.
    pub fn hold_writes(&self) -> Option<OwnedRwLockWriteGuard<()>> {
        self.write_gate.clone().try_write_owned().ok()
    }

    /// Seed or replace a row directly
    pub fn put(&self, table: &str, user_id: &str, record: Record) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.insert((table.to_string(), user_id.to_string()), record);
    }

    /// Snapshot a row without counting it as a select
    pub fn get(&self, table: &str, user_id: &str) -> Option<Record> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.get(&(table.to_string(), user_id.to_string())).cloned()
    }

    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Inserts plus updates
    pub fn write_count(&self) -> usize {
        self.insert_count() + self.update_count()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::WriteFailed("remote store rejected write".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn select_one(&self, table: &str, user_id: &str) -> Result<Option<Record>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::PersistenceUnavailable("remote store unreachable".to_string()));
        }
        Ok(self.get(table, user_id))
    }

    async fn insert_one(&self, table: &str, record: Record) -> Result<()> {
        let _gate = self.write_gate.read().await;
        self.check_writable()?;
        let user_id = record_user_id(&record)?;

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (table.to_string(), user_id);
        if rows.contains_key(&key) {
            return Err(Error::WriteFailed(format!(
                "{} already has a record for user {}",
                table, key.1
            )));
        }
        rows.insert(key, record);
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_one(&self, table: &str, user_id: &str, partial: Record) -> Result<()> {
        let _gate = self.write_gate.read().await;
        self.check_writable()?;

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .get_mut(&(table.to_string(), user_id.to_string()))
            .ok_or_else(|| Error::WriteFailed(format!("{} has no record for user {}", table, user_id)))?;
        for (k, v) in partial {
            row.insert(k, v);
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_select() {
        let store = MemoryRemoteStore::new();
        store
            .insert_one("user_preferences", record(json!({"user_id": "u1", "theme": "neotopia"})))
            .await
            .unwrap();

        let row = store.select_one("user_preferences", "u1").await.unwrap().unwrap();
        assert_eq!(row["theme"], "neotopia");
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryRemoteStore::new();
        let row = record(json!({"user_id": "u1"}));
        store.insert_one("t", row.clone()).await.unwrap();
        let err = store.insert_one("t", row).await.unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryRemoteStore::new();
        store
            .insert_one("t", record(json!({"user_id": "u1", "theme": "hackers", "volume": 0.7})))
            .await
            .unwrap();
        store.update_one("t", "u1", record(json!({"volume": 0.2}))).await.unwrap();

        let row = store.get("t", "u1").unwrap();
        assert_eq!(row["theme"], "hackers");
        assert_eq!(row["volume"], 0.2);
    }

    #[tokio::test]
    async fn test_update_missing_row_fails() {
        let store = MemoryRemoteStore::new();
        let err = store.update_one("t", "ghost", Record::new()).await.unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryRemoteStore::new();
        store.set_fail_reads(true);
        assert!(matches!(
            store.select_one("t", "u1").await.unwrap_err(),
            Error::PersistenceUnavailable(_)
        ));

        store.set_fail_writes(true);
        let err = store.insert_one("t", record(json!({"user_id": "u1"}))).await.unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_requires_user_id() {
        let store = MemoryRemoteStore::new();
        let err = store.insert_one("t", record(json!({"theme": "hackers"}))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
