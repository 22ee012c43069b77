//! Bounded in-memory key/value store.
//!
//! The map is guarded by an `RwLock` that is only held for in-memory work:
//! `save` copies the entries out and releases the lock before touching disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::snapshot::{self, SnapshotFile};

/// One key/value record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub last_updated: DateTime<Utc>,
}

/// Result of [`Store::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { path: PathBuf, entries: usize },
    Skipped { reason: SkipReason },
}

/// Result of [`Store::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { entries: usize, evicted: usize },
    NoSnapshot,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The store was built without a storage directory.
    NoStoragePath,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoStoragePath => f.write_str("no storage path configured"),
        }
    }
}

/// The collector's shared working set.
#[derive(Debug)]
pub struct Store {
    entries: RwLock<HashMap<String, StoreEntry>>,
    max_entries: AtomicUsize,
    storage_dir: Option<PathBuf>,
    // Set when the snapshot on disk could not be read; the next save moves it
    // aside instead of replacing it.
    unread_snapshot: AtomicBool,
    // Serializes writers of the temp file; never taken together with `entries`.
    save_guard: Mutex<()>,
}

impl Store {
    /// Memory-only store; `save` and `load` are no-ops.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: AtomicUsize::new(max_entries.max(1)),
            storage_dir: None,
            unread_snapshot: AtomicBool::new(false),
            save_guard: Mutex::new(()),
        }
    }

    /// Store persisted under `storage_dir`.
    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            storage_dir: Some(storage_dir.into()),
            ..Self::new(max_entries)
        }
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Path of the snapshot file, if persistence is configured.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.storage_dir.as_deref().map(snapshot::snapshot_path)
    }

    /// Keep the snapshot currently on disk: the next save renames it to
    /// `polo-store.json.corrupt-<timestamp>` before writing.
    pub fn preserve_existing_snapshot(&self) {
        self.unread_snapshot.store(true, Ordering::SeqCst);
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.load(Ordering::Relaxed)
    }

    /// Change the bound. Takes effect on the next [`Store::prune`].
    pub fn set_max_entries(&self, max_entries: usize) {
        self.max_entries.store(max_entries.max(1), Ordering::Relaxed);
    }

    // -----------------------------------------------------------------------
    // Map operations
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<StoreEntry> {
        self.read_map().get(key).cloned()
    }

    /// Insert or replace `key`, stamping it with the current time.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.put_at(key, value, Utc::now());
    }

    /// Insert or replace `key` with an explicit update time.
    pub fn put_at(&self, key: impl Into<String>, value: serde_json::Value, at: DateTime<Utc>) {
        let key = key.into();
        let entry = StoreEntry {
            key: key.clone(),
            value,
            last_updated: at,
        };
        self.write_map().insert(key, entry);
    }

    pub fn remove(&self, key: &str) -> Option<StoreEntry> {
        self.write_map().remove(key)
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    /// Copy of every entry, sorted by key.
    pub fn entries(&self) -> Vec<StoreEntry> {
        let mut entries: Vec<StoreEntry> = self.read_map().values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Evict the least recently updated entries until the store is within
    /// its bound. Returns the number of evicted entries.
    ///
    /// Ties on `last_updated` are broken by key so eviction is deterministic.
    pub fn prune(&self) -> usize {
        let bound = self.max_entries();
        let mut map = self.write_map();
        if map.len() <= bound {
            return 0;
        }

        let excess = map.len() - bound;
        let mut by_age: Vec<(DateTime<Utc>, String)> = map
            .values()
            .map(|e| (e.last_updated, e.key.clone()))
            .collect();
        by_age.sort();

        for (_, key) in by_age.into_iter().take(excess) {
            map.remove(&key);
        }
        drop(map);

        tracing::debug!("pruned {excess} store entries (bound {bound})");
        excess
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write every entry to the snapshot file.
    ///
    /// Without a storage directory nothing is written and the outcome says so.
    pub fn save(&self) -> Result<SaveOutcome, StoreError> {
        let Some(dir) = self.storage_dir.as_deref() else {
            return Ok(SaveOutcome::Skipped {
                reason: SkipReason::NoStoragePath,
            });
        };

        let _guard = self.save_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.unread_snapshot.load(Ordering::SeqCst) {
            if let Some(moved) = snapshot::set_aside(dir, Utc::now())? {
                tracing::warn!("kept unreadable snapshot as {}", moved.display());
            }
            self.unread_snapshot.store(false, Ordering::SeqCst);
        }

        let snapshot = SnapshotFile {
            saved_at: Utc::now(),
            entries: self.entries(),
        };
        let count = snapshot.entries.len();
        let path = snapshot::save_at(dir, &snapshot)?;
        tracing::debug!("saved {count} store entries to {}", path.display());
        Ok(SaveOutcome::Written {
            path,
            entries: count,
        })
    }

    /// Replace the in-memory entries with the saved snapshot, if any, then
    /// prune to the current bound.
    ///
    /// A snapshot that cannot be read is left in place and is moved aside by
    /// the next [`Store::save`], so it is never overwritten.
    pub fn load(&self) -> Result<LoadOutcome, StoreError> {
        let Some(dir) = self.storage_dir.as_deref() else {
            return Ok(LoadOutcome::Skipped {
                reason: SkipReason::NoStoragePath,
            });
        };

        let snapshot = match snapshot::load_at(dir) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(LoadOutcome::NoSnapshot),
            Err(err) => {
                self.preserve_existing_snapshot();
                return Err(err);
            }
        };
        self.unread_snapshot.store(false, Ordering::SeqCst);

        let restored: HashMap<String, StoreEntry> = snapshot
            .entries
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        let count = restored.len();
        *self.write_map() = restored;

        let evicted = self.prune();
        tracing::info!(
            "restored {} store entries from snapshot saved at {}",
            count - evicted,
            snapshot.saved_at
        );
        Ok(LoadOutcome::Loaded {
            entries: count - evicted,
            evicted,
        })
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, StoreEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, StoreEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
