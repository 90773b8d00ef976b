//! [`DedupStore`]: durable set of story identifiers already delivered.
//!
//! On disk the set is a single JSON object mapping each identifier to
//! `true`:
//! ```text
//! storage/
//!   mula_sent_stories.json   <- {"abc-123":true,"def-456":true}
//! ```
//! The whole set is rewritten after every successful insert, using the
//! write-to-temp-then-rename pattern so a crash never leaves a truncated
//! snapshot behind.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashSet;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use storywatch_core::ItemId;

use crate::error::StorageError;

/// Durable identifier set with lock-free reads.
///
/// `has` only touches the concurrent in-memory set. `add` serializes the
/// insert-snapshot-flush sequence through `write_lock`, so concurrent adds
/// never interleave their file writes and readers never wait on disk I/O.
pub struct DedupStore {
    path: PathBuf,
    ids: DashSet<ItemId>,
    write_lock: Mutex<()>,
}

impl DedupStore {
    /// Open (or create) the store backed by `path`.
    ///
    /// The parent directory is created if missing. An existing snapshot that
    /// cannot be parsed is a hard error: starting with an empty set would
    /// re-announce every historical story.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = non_empty_parent(&path) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let ids = DashSet::new();
        match std::fs::read(&path) {
            Ok(bytes) => {
                let seen: HashMap<String, bool> = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Corrupt {
                        path: path.clone(),
                        source: e,
                    })?;
                for id in seen.into_keys() {
                    ids.insert(ItemId::new(id));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&path, e)),
        }

        info!(path = %path.display(), entries = ids.len(), "dedup store opened");

        Ok(Self {
            path,
            ids,
            write_lock: Mutex::new(()),
        })
    }

    /// Whether `id` was already delivered.
    pub fn has(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` as delivered and persist the full set.
    ///
    /// On a write failure the identifier stays in memory (it will not be
    /// re-delivered by this process) but is absent from the snapshot, so a
    /// restart may announce it once more.
    pub async fn add(&self, id: ItemId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        self.ids.insert(id.clone());
        let snapshot = self.snapshot()?;
        self.flush(&snapshot).await?;

        debug!(item_id = %id, entries = self.ids.len(), "dedup snapshot written");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Path of the backing snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Result<Vec<u8>, StorageError> {
        // Sorted so consecutive snapshots diff cleanly.
        let map: BTreeMap<String, bool> = self
            .ids
            .iter()
            .map(|id| (id.as_str().to_string(), true))
            .collect();
        Ok(serde_json::to_vec(&map)?)
    }

    /// Write `bytes` to `<path>.tmp`, fsync, rename over `path`, fsync the
    /// directory.
    async fn flush(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp_path = self.path.with_extension("json.tmp");

        {
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| StorageError::io(&tmp_path, e))?;
            file.write_all(bytes)
                .await
                .map_err(|e| StorageError::io(&tmp_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| StorageError::io(&tmp_path, e))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;

        #[cfg(unix)]
        if let Some(parent) = non_empty_parent(&self.path) {
            let dir = tokio::fs::File::open(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
            dir.sync_all().await.map_err(|e| StorageError::io(parent, e))?;
        }

        Ok(())
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
