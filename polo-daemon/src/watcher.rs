//! Configuration watcher.
//!
//! ```text
//! Locating ──found──▶ Watching ──digest changed──▶ Reloading ──▶ Watching
//!    ▲                   │
//!    └──file unreadable──┘                        (any) ──stop──▶ Stopped
//! ```
//!
//! Each [`ConfigWatcher::poll_once`] call runs one tick of this machine. The
//! file is only parsed when its fingerprint differs from the last one seen,
//! and a snapshot is only published when the parse succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use polo_core::{
    config,
    fingerprint::{self, Fingerprint},
    locate::{self, SearchRoots},
    ConfigError, ConfigHandle, Configuration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Locating,
    Watching,
    Reloading,
    Stopped,
}

/// Result of one watcher tick.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    /// Same fingerprint as last time; nothing parsed.
    Unchanged,
    /// A new snapshot was published.
    Reloaded(Arc<Configuration>),
    /// No configuration file could be located.
    NotFound,
    /// The located file could not be read; it will be located again.
    Unreadable,
    /// The file changed but did not parse; the previous snapshot stays.
    Rejected,
    /// The watcher was stopped.
    Stopped,
}

pub struct ConfigWatcher {
    roots: SearchRoots,
    handle: ConfigHandle,
    state: WatchState,
    resolved: Option<PathBuf>,
    /// Fingerprint of the last file content that went through Reloading,
    /// whether or not it parsed.
    last_seen: Option<Fingerprint>,
    parses: u64,
}

impl ConfigWatcher {
    pub fn new(roots: SearchRoots, handle: ConfigHandle) -> Self {
        Self {
            roots,
            handle,
            state: WatchState::Locating,
            resolved: None,
            last_seen: None,
            parses: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn resolved_path(&self) -> Option<&PathBuf> {
        self.resolved.as_ref()
    }

    /// Number of times a configuration file has been parsed.
    pub fn parse_count(&self) -> u64 {
        self.parses
    }

    pub fn handle(&self) -> &ConfigHandle {
        &self.handle
    }

    pub fn stop(&mut self) {
        if self.state != WatchState::Stopped {
            tracing::debug!("configuration watcher stopped");
        }
        self.state = WatchState::Stopped;
    }

    /// Run one tick: locate if needed, hash, and reload on change.
    pub async fn poll_once(&mut self) -> ReloadOutcome {
        if self.state == WatchState::Stopped {
            return ReloadOutcome::Stopped;
        }

        if self.state == WatchState::Locating {
            let roots = self.roots.clone();
            match blocking(move || locate::resolve(&roots)).await {
                Ok(path) => {
                    if self.resolved.as_ref() != Some(&path) {
                        tracing::info!(path = %path.display(), "configuration file located");
                    }
                    self.resolved = Some(path);
                    self.state = WatchState::Watching;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "configuration not found, keeping current configuration");
                    return ReloadOutcome::NotFound;
                }
            }
        }

        let Some(path) = self.resolved.clone() else {
            self.state = WatchState::Locating;
            return ReloadOutcome::NotFound;
        };

        let target = path.clone();
        let digest = match blocking(move || fingerprint::fingerprint_file(&target)).await {
            Ok(digest) => digest,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "configuration unreadable, keeping current configuration",
                );
                self.state = WatchState::Locating;
                return ReloadOutcome::Unreadable;
            }
        };

        if self.last_seen.as_ref() == Some(&digest) {
            return ReloadOutcome::Unchanged;
        }

        self.state = WatchState::Reloading;
        self.parses += 1;
        let target = path.clone();
        let parsed = blocking(move || config::load_at(&target)).await;
        self.state = WatchState::Watching;

        match parsed {
            Ok(next) => {
                self.last_seen = next.fingerprint.clone().or(Some(digest));
                let next = Arc::new(next);
                self.handle.publish(Arc::clone(&next));
                tracing::info!(
                    path = %path.display(),
                    fingerprint = next.fingerprint.as_ref().map(Fingerprint::short).unwrap_or("-"),
                    sources = next.sources.len(),
                    "configuration reloaded",
                );
                ReloadOutcome::Reloaded(next)
            }
            Err(err) => {
                self.last_seen = Some(digest);
                if err.is_parse_error() {
                    tracing::error!(
                        path = %path.display(),
                        error = %err,
                        "configuration rejected, keeping previous configuration",
                    );
                    ReloadOutcome::Rejected
                } else {
                    // Vanished between hashing and reading.
                    tracing::warn!(path = %path.display(), error = %err, "configuration unreadable");
                    self.last_seen = None;
                    self.state = WatchState::Locating;
                    ReloadOutcome::Unreadable
                }
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ConfigError>
where
    F: FnOnce() -> Result<T, ConfigError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap_or_else(|err| {
        Err(ConfigError::Io {
            path: PathBuf::from("<blocking task>"),
            source: std::io::Error::other(err.to_string()),
        })
    })
}
