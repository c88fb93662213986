//! Persisted key/value storage for options.
//!
//! Backends offer batched reads, batched writes and a change channel that
//! reports every write to all subscribers of the same backend, including
//! the writer itself. Writes may carry an origin id so a writer can tell
//! its own echoes apart:
//! - `MemoryStorage` for tests and the in-process host
//! - `JsonlStorage` for an append-only JSON Lines file on disk

pub mod jsonl;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use jsonl::JsonlStorage;

/// Capacity of the change channel; slow receivers lag rather than block writers.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// One key written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageChange {
    /// Full key, `<namespace>.<field>`
    pub key: String,
    pub value: Value,
    /// Writer that asked for this change, if it identified itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Uuid>,
}

impl StorageChange {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Uuid) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Namespace part of the key. Namespaces may themselves contain dots,
    /// so the split happens at the last one.
    pub fn namespace(&self) -> Option<&str> {
        self.key.rsplit_once('.').map(|(ns, _)| ns)
    }

    pub fn field(&self) -> Option<&str> {
        self.key.rsplit_once('.').map(|(_, field)| field)
    }
}

/// Namespaced key/value backend.
#[async_trait]
pub trait OptionStorage: Send + Sync {
    /// Values for the keys that exist. Missing keys are simply absent.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Value>, StorageError>;

    /// Write all entries, then announce each one on the change channel
    /// tagged with `origin`.
    async fn set_many_from(
        &self,
        entries: Vec<(String, Value)>,
        origin: Option<Uuid>,
    ) -> Result<(), StorageError>;

    /// Anonymous write.
    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StorageError> {
        self.set_many_from(entries, None).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Shared in-memory storage. Clones see the same data and channel.
#[derive(Clone)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Value>>>,
    changes: broadcast::Sender<StorageChange>,
    reads: Arc<Mutex<usize>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            changes,
            reads: Arc::new(Mutex::new(0)),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of `get_many` calls served so far.
    pub fn read_count(&self) -> usize {
        *lock(&self.reads)
    }

    /// Number of `set_many` calls served so far.
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        lock(&self.data).clone()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OptionStorage for MemoryStorage {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Value>, StorageError> {
        *lock(&self.reads) += 1;
        let data = lock(&self.data);
        Ok(keys
            .iter()
            .filter_map(|k| data.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set_many_from(
        &self,
        entries: Vec<(String, Value)>,
        origin: Option<Uuid>,
    ) -> Result<(), StorageError> {
        {
            let mut data = lock(&self.data);
            for (key, value) in &entries {
                data.insert(key.clone(), value.clone());
            }
            *lock(&self.writes) += 1;
        }
        announce(&self.changes, entries, origin);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

pub(crate) fn announce(
    changes: &broadcast::Sender<StorageChange>,
    entries: Vec<(String, Value)>,
    origin: Option<Uuid>,
) {
    for (key, value) in entries {
        // No receivers is fine
        let _ = changes.send(StorageChange {
            key,
            value,
            origin,
        });
    }
}

/// Lock that shrugs off poisoning; the guarded maps stay consistent per write.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
