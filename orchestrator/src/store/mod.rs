//! Durable tables persisted as JSON files
//!
//! Each table is a map keyed by owner identity, held in memory and written
//! through to disk on every change. Writes go to a temporary file that is
//! renamed over the old one, so a crash never leaves a torn table.
//!
//! Every change bumps a generation. A flush writes the whole table as of the
//! moment it runs, so concurrent flushes coalesce: one that finds its
//! generation already on disk returns without writing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::auth::UserAccount;
use crate::container::Session;

/// Account table
pub type AccountTable = JsonTable<UserAccount>;

/// Session table
pub type SessionTable = JsonTable<Session>;

/// A string-keyed table backed by one JSON file
pub struct JsonTable<V> {
    rows: RwLock<HashMap<String, V>>,
    file_path: PathBuf,
    /// Bumped under the rows write lock
    generation: AtomicU64,
    /// Generation last written to disk; held for the duration of a write
    saved: Mutex<u64>,
}

impl<V> JsonTable<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open the table stored at `data_dir/file_name`, creating it empty
    pub async fn open(data_dir: &Path, file_name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join(file_name);

        let rows: HashMap<String, V> = match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file_path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", file_path.display()))
            }
        };

        info!(path = %file_path.display(), rows = rows.len(), "Table loaded");

        Ok(Self {
            rows: RwLock::new(rows),
            file_path,
            generation: AtomicU64::new(0),
            saved: Mutex::new(0),
        })
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.rows.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.rows.read().await.contains_key(key)
    }

    pub async fn values(&self) -> Vec<V> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Insert or replace a row and persist the table
    pub async fn upsert(&self, key: &str, value: V) -> Result<()> {
        let generation = self.stage(key, value).await;
        self.flush(generation).await
    }

    /// Insert or replace a row in memory only. Returns the generation to pass
    /// to [`JsonTable::flush`].
    pub async fn stage(&self, key: &str, value: V) -> u64 {
        let mut rows = self.rows.write().await;
        rows.insert(key.to_string(), value);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Insert a row only if the key is free. Returns false if it was taken.
    pub async fn insert_new(&self, key: &str, value: V) -> Result<bool> {
        let generation = {
            let mut rows = self.rows.write().await;
            if rows.contains_key(key) {
                return Ok(false);
            }
            rows.insert(key.to_string(), value);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.flush(generation).await?;
        Ok(true)
    }

    /// Latest generation, written or not
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Make sure everything up to `generation` is on disk
    pub async fn flush(&self, generation: u64) -> Result<()> {
        let mut saved = self.saved.lock().await;
        if *saved >= generation {
            return Ok(());
        }

        let (current, json) = {
            let rows = self.rows.read().await;
            let json = serde_json::to_string_pretty(&*rows).context("Failed to serialize table")?;
            (self.generation.load(Ordering::SeqCst), json)
        };

        let tmp_path = self.file_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .with_context(|| format!("Failed to replace {}", self.file_path.display()))?;

        *saved = current;
        Ok(())
    }
}
