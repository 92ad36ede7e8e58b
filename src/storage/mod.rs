//! Persisted dedup state for delivered items.
//!
//! The store is a single UTF-8 JSON object mapping composite keys
//! (`platform:game:id`) to the last delivered state of that item:
//!
//! ```text
//! {
//!   "hoyolab:genshin:123": {
//!     "last_modified": 1700000000,
//!     "last_sent_hash": "ab12…"
//!   }
//! }
//! ```
//!
//! Updates are buffered in memory during a cycle and committed in one
//! atomic write (temp file, then rename) so an interrupted run can never
//! leave a mixture of old and new state on disk. A missing or unparsable
//! file loads as an empty map, which forces baseline mode upstream;
//! corruption is never fatal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::FeedKey;

/// Persisted per-item state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Effective timestamp of the last committed version (epoch seconds)
    pub last_modified: i64,

    /// Hash of the last delivered representation; empty for items staged
    /// in baseline mode without a delivery
    pub last_sent_hash: String,
}

/// File-backed map of delivered items.
///
/// Mutated by a single writer at end-of-cycle only; `stage` buffers in
/// memory, `save` commits everything at once.
pub struct StateStore {
    path: PathBuf,
    entries: BTreeMap<String, StateRecord>,
}

impl StateStore {
    /// Load the store from disk.
    ///
    /// A missing or corrupt file yields an empty store; the damage is
    /// logged and the caller sees a first run.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("State file {path:?} is unreadable ({e}); starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("State file {path:?} could not be read ({e}); starting empty");
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    /// Whether the store holds no records (baseline mode trigger).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up the record for a key.
    pub fn get(&self, key: &FeedKey) -> Option<&StateRecord> {
        self.entries.get(&key.to_string())
    }

    /// Buffer an update for the next `save`.
    pub fn stage(&mut self, key: &FeedKey, record: StateRecord) {
        self.entries.insert(key.to_string(), record);
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit all buffered updates in one atomic write.
    ///
    /// Write-new-then-replace: the serialized map goes to a sibling temp
    /// file which is renamed over the original, so a crash mid-write
    /// leaves the prior state intact.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = self.path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::state(format!("commit of {:?} failed: {e}", self.path)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Game, Platform};
    use tempfile::TempDir;

    fn key(id: &str) -> FeedKey {
        FeedKey::new(Platform::Hoyolab, Game::Genshin, id)
    }

    fn record(ts: i64) -> StateRecord {
        StateRecord {
            last_modified: ts,
            last_sent_hash: format!("hash-{ts}"),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::load(tmp.path().join("state.json")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = StateStore::load(&path).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn save_and_reload_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let mut store = StateStore::load(&path).await;
        store.stage(&key("1"), record(100));
        store.stage(&key("2"), record(200));
        store.save().await.unwrap();

        let reloaded = StateStore::load(&path).await;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(&key("1")), Some(&record(100)));
        assert_eq!(reloaded.get(&key("2")), Some(&record(200)));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let mut store = StateStore::load(&path).await;
        store.stage(&key("1"), record(100));
        store.save().await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn stage_overwrites_buffered_record() {
        let tmp = TempDir::new().unwrap();
        let mut store = StateStore::load(tmp.path().join("state.json")).await;

        store.stage(&key("1"), record(100));
        store.stage(&key("1"), record(300));
        assert_eq!(store.get(&key("1")), Some(&record(300)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn output_is_utf8_json_with_composite_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let mut store = StateStore::load(&path).await;
        store.stage(&key("123"), record(100));
        store.save().await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["hoyolab:genshin:123"]["last_modified"], 100);
    }
}
