use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime.
///
/// Only startup failures (runtime, signal handlers, log directory) surface
/// here; store and check failures are logged and retried instead.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] polo_core::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] polo_store::StoreError),

    #[error("task queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("signal handler failed: {0}")]
    Signal(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
