//! JSONL (JSON Lines) option storage.
//!
//! Each line is one `{"key": ..., "value": ...}` record. Writes append, and
//! on read the last record for a key wins. `compact` rewrites the file with
//! one line per key.
//!
//! Every storage opened on the same path in this process shares one file
//! lock and one change channel, so writes through one handle reach the
//! subscribers of all others.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{announce, lock, OptionStorage, StorageChange, StorageError, CHANGE_CHANNEL_CAPACITY};

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    key: String,
    value: Value,
}

/// File lock and change channel of one path.
#[derive(Clone)]
struct PathShared {
    io: Arc<Mutex<()>>,
    changes: broadcast::Sender<StorageChange>,
}

/// Registry entry for `path`, created on first use.
fn shared_for(path: &Path) -> PathShared {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, PathShared>>> = OnceLock::new();

    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    lock(registry)
        .entry(key)
        .or_insert_with(|| PathShared {
            io: Arc::new(Mutex::new(())),
            changes: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
        })
        .clone()
}

/// File-backed storage.
#[derive(Clone)]
pub struct JsonlStorage {
    path: PathBuf,
    io: Arc<Mutex<()>>,
    changes: broadcast::Sender<StorageChange>,
}

impl JsonlStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let PathShared { io, changes } = shared_for(&path);
        Self { path, io, changes }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Latest value of every key in the file.
    fn read_latest(&self) -> Result<HashMap<String, Value>, StorageError> {
        if !self.exists() {
            return Ok(HashMap::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut latest = HashMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => {
                    latest.insert(record.key, record.value);
                }
                Err(e) => {
                    warn!(
                        "Failed to parse line {} in {:?}: {}",
                        line_num + 1,
                        self.path,
                        e
                    );
                }
            }
        }

        Ok(latest)
    }

    fn append(&self, entries: &[(String, Value)]) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);

        for (key, value) in entries {
            let record = Record {
                key: key.clone(),
                value: value.clone(),
            };
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        }

        writer.flush()?;
        debug!("Appended {} option records to {:?}", entries.len(), self.path);
        Ok(())
    }

    /// Rewrite the file keeping only the latest record per key.
    pub fn compact(&self) -> Result<usize, StorageError> {
        let _guard = lock(&self.io);
        let latest = self.read_latest()?;
        self.ensure_dir()?;

        let mut keys: Vec<&String> = latest.keys().collect();
        keys.sort();

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for key in &keys {
                let record = Record {
                    key: (*key).clone(),
                    value: latest[*key].clone(),
                };
                writeln!(writer, "{}", serde_json::to_string(&record)?)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!("Compacted {:?} to {} records", self.path, keys.len());
        Ok(keys.len())
    }
}

#[async_trait]
impl OptionStorage for JsonlStorage {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Value>, StorageError> {
        let _guard = lock(&self.io);
        let mut latest = self.read_latest()?;
        Ok(keys
            .iter()
            .filter_map(|k| latest.remove(k).map(|v| (k.clone(), v)))
            .collect())
    }

    async fn set_many_from(
        &self,
        entries: Vec<(String, Value)>,
        origin: Option<Uuid>,
    ) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        {
            let _guard = lock(&self.io);
            self.append(&entries)?;
        }
        announce(&self.changes, entries, origin);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
