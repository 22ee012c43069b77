//! Tracing subscriber setup.
//!
//! Events always go to stderr. With a log file they are also appended to it;
//! the file is reopened per event so rotation can rename it at any time.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{io_err, DaemonError};

/// `RUST_LOG` wins; otherwise `debug` when verbose, `info` if not.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<(), DaemonError> {
    let filter = env_filter(verbose);

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
            let file = AppendFile::new(path);
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(io::stderr.and(file))
                .try_init();
        }
        None => {
            let _ = fmt().with_env_filter(filter).with_target(false).try_init();
        }
    }
    Ok(())
}

/// Opens `path` in append mode for every write batch.
///
/// When the file cannot be opened the batch is dropped; the first such
/// failure is reported once on stderr.
#[derive(Debug, Clone)]
pub struct AppendFile {
    path: PathBuf,
    reported: Arc<AtomicBool>,
}

impl AppendFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an open failure has been reported.
    pub fn open_failed(&self) -> bool {
        self.reported.load(Ordering::Relaxed)
    }
}

impl<'a> fmt::MakeWriter<'a> for AppendFile {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Box::new(file),
            Err(err) => {
                if !self.reported.swap(true, Ordering::Relaxed) {
                    // Not through tracing: that would recurse into this writer.
                    eprintln!(
                        "polo: cannot open log file {}: {err}; file log lines are dropped until it can be opened",
                        self.path.display()
                    );
                }
                Box::new(io::sink())
            }
        }
    }
}
