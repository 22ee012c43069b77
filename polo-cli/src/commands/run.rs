//! `polo run`: the daemon in the foreground.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use polo_daemon::{start_blocking, DaemonOptions};
use polo_store::SaveOutcome;

/// Arguments for `polo run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of workers; defaults to half the CPUs, rounded up.
    #[arg(short = 't', long = "thread-count", value_parser = clap::value_parser!(u16).range(1..))]
    pub thread_count: Option<u16>,

    /// Append logs to this file as well as stderr.
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Directory holding the store snapshot. Without it nothing is persisted.
    #[arg(short = 'p', long = "storage-path")]
    pub storage_path: Option<PathBuf>,

    /// Configuration file; skips the usual search locations.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG still wins).
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let options = self.into_options();
        let summary = start_blocking(options).context("daemon exited with error")?;

        match &summary.saved {
            Some(SaveOutcome::Written { path, entries }) => {
                eprintln!("saved {entries} entries to {}", path.display());
            }
            Some(SaveOutcome::Skipped { .. }) => {}
            None => anyhow::bail!("final store save failed; see the log for details"),
        }
        Ok(())
    }

    fn into_options(self) -> DaemonOptions {
        DaemonOptions {
            config_path: self.config,
            storage_dir: self.storage_path,
            workers: self.thread_count.map(usize::from),
            log_file: self.log_file,
            verbose: self.verbose,
            watch_interval: None,
        }
    }
}
