//! Error types for polo-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while locating, hashing or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path that was touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No configuration file resolved from any search location.
    #[error("no configuration file found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    /// YAML parse error on load; serde_yaml's message carries the line context.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON parse error on load (configuration files with a `.json` extension).
    #[error("failed to parse configuration at {path}: {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file parsed but describes an unusable configuration.
    #[error("invalid configuration at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl ConfigError {
    /// `true` for the errors that mean "the file exists but is malformed".
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ConfigError::Parse { .. } | ConfigError::ParseJson { .. } | ConfigError::Invalid { .. }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
