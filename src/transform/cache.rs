//! Content-addressed transform cache (spec §4.C, testable properties 4-5).

use crate::fs::FileSystem;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bump this whenever the on-disk cache entry shape changes; a mismatch
/// against the persisted index purges the entire cache directory on load
/// (testable property 5).
pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub content_hash: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CacheIndex {
    format_version: u32,
    entries: Vec<CacheEntry>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            entries: Vec::new(),
        }
    }
}

/// A content-addressed, disk-persisted cache of transform outputs. One
/// file per `(key, content_hash)` pair, plus an index file recording
/// every live entry.
pub struct TransformCache {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    index: Mutex<CacheIndex>,
    /// Per-key producer serialization: duplicate concurrent requests for
    /// the same key wait on the same lock instead of racing to produce.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn safe_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn entry_filename(key: &str, content_hash: &str) -> String {
    let short_hash: String = content_hash.chars().take(12).collect();
    format!("{}.{short_hash}.cache", safe_key(key))
}

impl TransformCache {
    /// Load the index from `dir`, purging the whole directory first if
    /// its persisted format version doesn't match [`FORMAT_VERSION`].
    pub async fn load(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Result<Self> {
        fs.mkdir_recursive(&dir).await?;
        let index_path = dir.join("index.json");
        let index = match fs.read_text(&index_path).await {
            Ok(text) => match serde_json::from_str::<CacheIndex>(&text) {
                Ok(index) if index.format_version == FORMAT_VERSION => index,
                _ => {
                    purge_dir(fs.as_ref(), &dir).await;
                    CacheIndex::default()
                }
            },
            Err(_) => CacheIndex::default(),
        };
        Ok(Self {
            fs,
            dir,
            index: Mutex::new(index),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Return the cached bytes for `(key, content_hash)` if present;
    /// otherwise invoke `produce`, persist its result, evict any stale
    /// entry for `key` under a different hash, and return the fresh
    /// bytes. `produce` runs at most once per distinct `(key,
    /// content_hash)` pair even under concurrent callers for the same
    /// key (testable property 4).
    pub async fn get_or_produce<F, Fut>(
        &self,
        key: &str,
        content_hash: &str,
        now: u64,
        produce: F,
    ) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let key_lock = self.lock_for(key).await;
        let _guard = key_lock.lock().await;

        if let Some(existing) = self
            .index
            .lock()
            .await
            .entries
            .iter()
            .find(|e| e.key == key && e.content_hash == content_hash)
            .cloned()
        {
            let path = self.dir.join(entry_filename(&existing.key, &existing.content_hash));
            if let Ok(bytes) = self.fs.read_bytes(&path).await {
                return Ok(bytes);
            }
            // Corrupt/missing cache file: degrade gracefully, fall through
            // to re-producing without caching (testable disposition
            // "transient").
            return produce().await;
        }

        let bytes = produce().await?;

        let stale: Vec<CacheEntry> = {
            let index = self.index.lock().await;
            index.entries.iter().filter(|e| e.key == key).cloned().collect()
        };
        for stale_entry in &stale {
            let stale_path = self
                .dir
                .join(entry_filename(&stale_entry.key, &stale_entry.content_hash));
            let _ = self.fs.unlink(&stale_path).await;
        }

        let new_path = self.dir.join(entry_filename(key, content_hash));
        if self.fs.write(&new_path, &bytes).await.is_err() {
            // Write failure degrades gracefully: the value is still
            // returned, just uncached.
            return Ok(bytes);
        }

        {
            let mut index = self.index.lock().await;
            index.entries.retain(|e| e.key != key);
            index.entries.push(CacheEntry {
                key: key.to_string(),
                content_hash: content_hash.to_string(),
                timestamp: now,
            });
            let index_path = self.dir.join("index.json");
            if let Ok(text) = serde_json::to_string_pretty(&*index) {
                let _ = self.fs.write(&index_path, text.as_bytes()).await;
            }
        }

        Ok(bytes)
    }
}

async fn purge_dir(fs: &dyn FileSystem, dir: &Path) {
    if let Ok(entries) = fs.read_dir(dir).await {
        for entry in entries {
            let _ = fs.unlink(&dir.join(&entry.name)).await;
        }
    }
}
