//! Domain types for polo configuration.
//!
//! A [`Configuration`] is an immutable snapshot: it is parsed once, shared as
//! `Arc<Configuration>` and replaced wholesale on reload.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a configured source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// One entry of the `sources:` list.
///
/// Only `id` means anything to the core; every other key is collected into
/// `params` and handed to the source-check capability untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: SourceId,
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<SourceId>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style helper, mostly for tests and embedding.
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// String-valued parameter, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 3600;
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Operational parameters. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Delay between two checks of the same healthy source.
    pub poll_interval_secs: u64,
    /// Upper bound for a single source-check call.
    pub check_timeout_secs: u64,
    /// Cap for the backoff delay of a failing source.
    pub max_backoff_secs: u64,
    /// Store bound enforced by pruning.
    pub max_entries: usize,
    /// Period of the background store flush.
    pub flush_interval_secs: u64,
    /// Worker count; the `--thread-count` flag wins over this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            workers: None,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Returns the name of the first field holding an unusable value.
    pub(crate) fn first_invalid_field(&self) -> Option<&'static str> {
        if self.poll_interval_secs == 0 {
            return Some("poll_interval_secs");
        }
        if self.check_timeout_secs == 0 {
            return Some("check_timeout_secs");
        }
        if self.max_backoff_secs == 0 {
            return Some("max_backoff_secs");
        }
        if self.max_entries == 0 {
            return Some("max_entries");
        }
        if self.flush_interval_secs == 0 {
            return Some("flush_interval_secs");
        }
        if self.workers == Some(0) {
            return Some("workers");
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Configuration snapshot
// ---------------------------------------------------------------------------

/// A complete, immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Digest of the file this snapshot was parsed from; `None` for the
    /// built-in empty configuration.
    pub fingerprint: Option<Fingerprint>,
    pub origin: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
    pub settings: Settings,
    pub sources: Vec<SourceDescriptor>,
}

impl Configuration {
    /// The configuration in effect before any file has been found.
    pub fn empty() -> Self {
        Self {
            fingerprint: None,
            origin: None,
            loaded_at: Utc::now(),
            settings: Settings::default(),
            sources: Vec::new(),
        }
    }

    pub fn source(&self, id: &SourceId) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| &s.id == id)
    }

    pub fn contains_source(&self, id: &SourceId) -> bool {
        self.source(id).is_some()
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.iter().map(|s| &s.id)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::empty()
    }
}
