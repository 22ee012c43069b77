//! Size-based rotation for the daemon log file.
//!
//! `polo.log` is rotated once it reaches 10 MiB; at most 5 numbered copies
//! are kept:
//!   polo.log → polo.log.1 → polo.log.2 → … → polo.log.5 (dropped next time)
//!
//! The log writer reopens the file for every event, so renaming the live
//! file underneath it is safe.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            keep: MAX_ROTATED_FILES,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log` if it is at or over the size limit.
    ///
    /// Returns `Ok(false)` when the file is small enough or does not exist.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        if self.keep == 0 {
            fs::remove_file(log)?;
            return Ok(true);
        }

        remove_if_present(&backup_path(log, self.keep))?;
        for n in (1..self.keep).rev() {
            let from = backup_path(log, n);
            if from.exists() {
                fs::rename(&from, backup_path(log, n + 1))?;
            }
        }
        fs::rename(log, backup_path(log, 1))?;
        Ok(true)
    }
}

/// Rotate `log` under the default policy, logging instead of failing.
pub fn rotate_log(log: &Path) {
    match RotationPolicy::default().rotate(log) {
        Ok(true) => tracing::info!(path = %log.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log.display(), error = %err, "log rotation failed"),
    }
}

/// `polo.log` + 2 → `polo.log.2`
pub fn backup_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| crate::paths::DAEMON_LOG.into());
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
