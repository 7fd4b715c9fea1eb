pub mod migrate;
pub mod types;
pub mod versioned;

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cnidarium::{StateDelta, StateWrite, Storage};
use tracing::debug;

pub use versioned::StateStore;

// Key prefixes (no trailing slashes, cnidarium convention)
pub const STATE_PREFIX: &str = "state";
pub const LEGACY_PREFIX: &str = "legacy";

/// Flat key/value persistence. Implementations must make `set` atomic:
/// a reader sees either the old value or the new one.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// `KvStore` backed by a cnidarium `Storage`. Every write is its own committed delta.
pub struct CnidariumStore {
    storage: Storage,
    // Deltas are built on the latest snapshot, so commits must not interleave.
    commit_lock: tokio::sync::Mutex<()>,
}

impl CnidariumStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![STATE_PREFIX.to_string(), LEGACY_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self {
            storage,
            commit_lock: tokio::sync::Mutex::new(()),
        })
    }
}

#[async_trait]
impl KvStore for CnidariumStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use cnidarium::StateRead;
        let snapshot = self.storage.latest_snapshot();
        snapshot
            .get_raw(key)
            .await
            .with_context(|| format!("read {}", key))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        let size = value.len();
        delta.put_raw(key.to_string(), value);
        self.storage
            .commit(delta)
            .await
            .with_context(|| format!("commit {}", key))?;
        debug!(key, size, "value stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.delete(key.to_string());
        self.storage
            .commit(delta)
            .await
            .with_context(|| format!("delete {}", key))?;
        debug!(key, "value removed");
        Ok(())
    }
}

/// In-memory store for tests. Counts writes and can be told to fail.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    values: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    writes: std::sync::atomic::AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
    fail_writes: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Reads keep working; `set` and `remove` fail.
    pub fn set_failing_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().unwrap().contains_key(key)
    }

    pub fn put_json(&self, key: &str, value: serde_json::Value) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), serde_json::to_vec(&value).unwrap());
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        self.check()?;
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("store is read-only");
        }
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_write()?;
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_write()?;
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cnidarium_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = CnidariumStore::new(dir.path()).await.unwrap();

        assert!(store.get("state/u1/document").await.unwrap().is_none());
        store
            .set("state/u1/document", b"{\"a\":1}".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get("state/u1/document").await.unwrap().as_deref(),
            Some(&b"{\"a\":1}"[..])
        );

        store.remove("state/u1/document").await.unwrap();
        assert!(store.get("state/u1/document").await.unwrap().is_none());
    }
}
