//! Reactive option store.
//!
//! An [`OptionStore`] owns the in-memory values of one namespace, backed by
//! an [`OptionStorage`]. The schema is an explicit list of fields with their
//! defaults; keys are stored as `<namespace>.<field>`.
//!
//! Values are loaded in one batched read on first access. A field missing
//! from storage keeps its default and is not written until it is set.
//! Writes made through another store over the same storage arrive on the
//! storage change channel and are reconciled into this one by [`OptionStore::watch`].
//! A store tags its own writes with its origin id and skips their echoes.

pub mod range;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::notify::{Listeners, Subscription};
use crate::storage::{OptionStorage, StorageChange, StorageError};

pub use range::{RangeOptionStore, DEFAULT_RANGE_NAMESPACE};

#[derive(Debug, Error)]
pub enum OptionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unknown option {namespace}.{field}")]
    UnknownField { namespace: String, field: String },

    #[error("Invalid value {value:?} for option {field}")]
    InvalidValue { field: String, value: String },
}

/// A field and its compiled-in default.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub default: fn() -> Value,
}

/// Fields of one namespace.
#[derive(Debug, Clone)]
pub struct OptionSchema {
    pub namespace: String,
    pub fields: &'static [FieldSpec],
}

impl OptionSchema {
    pub fn new(namespace: impl Into<String>, fields: &'static [FieldSpec]) -> Self {
        Self {
            namespace: namespace.into(),
            fields,
        }
    }

    pub fn key(&self, field: &str) -> String {
        format!("{}.{}", self.namespace, field)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn defaults(&self) -> HashMap<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.name.to_string(), (f.default)()))
            .collect()
    }
}

/// Emitted to subscribers whenever a value actually changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChange {
    pub namespace: String,
    pub field: String,
    pub value: Value,
}

struct StoreInner {
    /// Tag on this store's own writes
    origin: Uuid,
    schema: OptionSchema,
    storage: Arc<dyn OptionStorage>,
    values: Mutex<HashMap<String, Value>>,
    loaded: OnceCell<()>,
    listeners: Listeners<OptionChange>,
}

/// Option values of one namespace. Clones share state and listeners.
#[derive(Clone)]
pub struct OptionStore {
    inner: Arc<StoreInner>,
}

impl OptionStore {
    pub fn new(schema: OptionSchema, storage: Arc<dyn OptionStorage>) -> Self {
        let values = schema.defaults();
        Self {
            inner: Arc::new(StoreInner {
                origin: Uuid::new_v4(),
                schema,
                storage,
                values: Mutex::new(values),
                loaded: OnceCell::new(),
                listeners: Listeners::new(),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.schema.namespace
    }

    pub fn schema(&self) -> &OptionSchema {
        &self.inner.schema
    }

    /// Load every field in one batched read. Runs once; a failed load is
    /// retried on the next access.
    pub async fn load(&self) -> Result<(), OptionError> {
        self.inner
            .loaded
            .get_or_try_init(|| async {
                let schema = &self.inner.schema;
                let keys: Vec<String> = schema.fields.iter().map(|f| schema.key(f.name)).collect();
                let stored = self.inner.storage.get_many(&keys).await?;

                let mut values = lock(&self.inner.values);
                for field in schema.fields {
                    if let Some(value) = stored.get(&schema.key(field.name)) {
                        values.insert(field.name.to_string(), value.clone());
                    }
                }
                debug!(
                    "Loaded {} of {} options for {}",
                    stored.len(),
                    keys.len(),
                    schema.namespace
                );
                Ok::<(), OptionError>(())
            })
            .await?;
        Ok(())
    }

    pub async fn get(&self, field: &str) -> Result<Value, OptionError> {
        self.check_field(field)?;
        self.load().await?;
        Ok(lock(&self.inner.values)
            .get(field)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// All current values of the namespace.
    pub async fn values(&self) -> Result<HashMap<String, Value>, OptionError> {
        self.load().await?;
        Ok(lock(&self.inner.values).clone())
    }

    /// Set a field. Returns `false` without writing or notifying when the
    /// value is unchanged. On storage failure the in-memory value is kept.
    pub async fn set(&self, field: &str, value: Value) -> Result<bool, OptionError> {
        self.check_field(field)?;
        self.load().await?;

        if lock(&self.inner.values).get(field) == Some(&value) {
            return Ok(false);
        }

        let key = self.inner.schema.key(field);
        if let Err(e) = self
            .inner
            .storage
            .set_many_from(vec![(key.clone(), value.clone())], Some(self.inner.origin))
            .await
        {
            warn!("Failed to persist {}: {}", key, e);
            return Err(e.into());
        }

        self.apply(field, value);
        Ok(true)
    }

    /// Fold an external storage change into this store. Returns whether the
    /// in-memory value changed.
    pub fn reconcile(&self, change: &StorageChange) -> bool {
        if change.namespace() != Some(self.namespace()) {
            return false;
        }
        let Some(field) = change.field() else {
            return false;
        };
        if self.inner.schema.field(field).is_none() {
            return false;
        }
        self.apply(field, change.value.clone())
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&OptionChange) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    /// Follow the storage change channel until the store or the storage
    /// goes away. Echoes of this store's own writes are skipped; `set` has
    /// already applied them.
    pub fn watch(&self) -> JoinHandle<()> {
        let mut changes = self.inner.storage.subscribe();
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let origin = self.inner.origin;

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.origin == Some(origin) => continue,
                    Ok(change) => {
                        let Some(inner) = weak.upgrade() else { break };
                        OptionStore { inner }.reconcile(&change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Option watcher lagged, {} changes skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn check_field(&self, field: &str) -> Result<(), OptionError> {
        match self.inner.schema.field(field) {
            Some(_) => Ok(()),
            None => Err(OptionError::UnknownField {
                namespace: self.namespace().to_string(),
                field: field.to_string(),
            }),
        }
    }

    fn apply(&self, field: &str, value: Value) -> bool {
        {
            let mut values = lock(&self.inner.values);
            if values.get(field) == Some(&value) {
                return false;
            }
            values.insert(field.to_string(), value.clone());
        }

        debug!("Option {}.{} changed", self.namespace(), field);
        self.inner.listeners.notify(&OptionChange {
            namespace: self.namespace().to_string(),
            field: field.to_string(),
            value,
        });
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
