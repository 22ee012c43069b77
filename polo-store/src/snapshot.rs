//! Snapshot file, the durable form of the store.
//!
//! Persists a [`SnapshotFile`] JSON document at `<storage_dir>/polo-store.json`.
//! Writes go to `polo-store.json.tmp`, are fsynced, then renamed over the
//! live file, so a reader only ever sees a complete snapshot.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::store::StoreEntry;

pub const SNAPSHOT_FILE_NAME: &str = "polo-store.json";

/// On-disk snapshot payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFile {
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<StoreEntry>,
}

/// Lenient read shape: hand-edited snapshots may omit timestamps.
#[derive(Debug, Deserialize)]
struct SnapshotCompat {
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: Vec<EntryCompat>,
}

#[derive(Debug, Deserialize)]
struct EntryCompat {
    key: String,
    value: serde_json::Value,
    last_updated: Option<DateTime<Utc>>,
}

/// `<storage_dir>/polo-store.json`
pub fn snapshot_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(SNAPSHOT_FILE_NAME)
}

/// `<storage_dir>/polo-store.json.tmp`
pub fn temp_path(storage_dir: &Path) -> PathBuf {
    snapshot_path(storage_dir).with_extension("json.tmp")
}

/// `<storage_dir>/polo-store.json.corrupt-<UTC timestamp>`
pub fn set_aside_path(storage_dir: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut name = std::ffi::OsString::from(SNAPSHOT_FILE_NAME);
    name.push(format!(".corrupt-{}", at.format("%Y%m%dT%H%M%SZ")));
    storage_dir.join(name)
}

/// Rename the snapshot under `storage_dir` out of the way so the next save
/// does not replace it. Returns the new path, or `None` if there was no file.
pub fn set_aside(storage_dir: &Path, at: DateTime<Utc>) -> Result<Option<PathBuf>, StoreError> {
    let path = snapshot_path(storage_dir);
    if !path.exists() {
        return Ok(None);
    }
    let target = set_aside_path(storage_dir, at);
    std::fs::rename(&path, &target).map_err(|e| io_err(&path, e))?;
    Ok(Some(target))
}

/// Load the snapshot under `storage_dir`.
///
/// Returns `None` if no snapshot has been written yet. A leftover temp file
/// from an interrupted write is ignored.
pub fn load_at(storage_dir: &Path) -> Result<Option<SnapshotFile>, StoreError> {
    let path = snapshot_path(storage_dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let compat: SnapshotCompat = serde_json::from_str(&contents)
        .map_err(|source| StoreError::Corrupt { path, source })?;

    let saved_at = compat.saved_at.unwrap_or_else(Utc::now);
    let entries = compat
        .entries
        .into_iter()
        .map(|e| StoreEntry {
            key: e.key,
            value: e.value,
            last_updated: e.last_updated.unwrap_or(saved_at),
        })
        .collect();
    Ok(Some(SnapshotFile { saved_at, entries }))
}

/// Save `snapshot` under `storage_dir` atomically, returning the final path.
pub fn save_at(storage_dir: &Path, snapshot: &SnapshotFile) -> Result<PathBuf, StoreError> {
    std::fs::create_dir_all(storage_dir).map_err(|e| io_err(storage_dir, e))?;

    let path = snapshot_path(storage_dir);
    let tmp = temp_path(storage_dir);
    let json = serde_json::to_vec_pretty(snapshot)?;

    let mut file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
    file.write_all(&json).map_err(|e| io_err(&tmp, e))?;
    file.sync_all().map_err(|e| io_err(&tmp, e))?;
    drop(file);

    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn no_snapshot_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(load_at(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let snapshot = SnapshotFile {
            saved_at: Utc::now(),
            entries: Vec::new(),
        };
        save_at(tmp.path(), &snapshot).unwrap();
        assert!(
            !temp_path(tmp.path()).exists(),
            "tmp file should be removed after atomic rename"
        );
        assert!(snapshot_path(tmp.path()).exists());
    }

    #[test]
    fn save_creates_missing_storage_dir() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        let snapshot = SnapshotFile {
            saved_at: Utc::now(),
            entries: Vec::new(),
        };
        let path = save_at(&nested, &snapshot).unwrap();
        assert_eq!(path, nested.join(SNAPSHOT_FILE_NAME));
    }

    #[test]
    fn entries_without_timestamps_inherit_saved_at() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            snapshot_path(tmp.path()),
            r#"{"saved_at":"2024-01-02T03:04:05Z","entries":[{"key":"k","value":{"n":1}}]}"#,
        )
        .unwrap();

        let loaded = load_at(tmp.path()).unwrap().expect("snapshot");
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].value, json!({"n": 1}));
        assert_eq!(loaded.entries[0].last_updated, loaded.saved_at);
    }

    #[test]
    fn set_aside_keeps_the_bytes_under_a_timestamped_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(snapshot_path(tmp.path()), "{ broken").unwrap();
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let moved = set_aside(tmp.path(), at).unwrap().expect("moved");
        assert_eq!(
            moved,
            tmp.path().join("polo-store.json.corrupt-20260301T120000Z")
        );
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "{ broken");
        assert!(!snapshot_path(tmp.path()).exists());

        assert!(set_aside(tmp.path(), at).unwrap().is_none());
    }

    #[test]
    fn garbage_snapshot_is_reported_as_corrupt() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(snapshot_path(tmp.path()), "{ not json").unwrap();
        let err = load_at(tmp.path()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got: {err}");
        assert!(err.to_string().contains(SNAPSHOT_FILE_NAME));
    }
}
