//! `polo inspect`: read a saved snapshot without starting the daemon.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use polo_store::{snapshot, SnapshotFile, StoreEntry};

const VALUE_PREVIEW_CHARS: usize = 60;

/// Arguments for `polo inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Storage directory passed to `polo run -p`.
    #[arg(short = 'p', long = "storage-path")]
    pub storage_path: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        let snap = snapshot::load_at(&self.storage_path).with_context(|| {
            format!(
                "failed to read store snapshot in {}",
                self.storage_path.display()
            )
        })?;

        if self.json {
            return print_json(&self.storage_path, snap.as_ref());
        }
        print_table(&self.storage_path, snap);
        Ok(())
    }
}

#[derive(Serialize)]
struct InspectJson<'a> {
    snapshot: String,
    saved_at: Option<DateTime<Utc>>,
    entries: &'a [StoreEntry],
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "updated")]
    updated: String,
    #[tabled(rename = "value")]
    value: String,
}

fn print_json(dir: &Path, snap: Option<&SnapshotFile>) -> Result<()> {
    let payload = InspectJson {
        snapshot: snapshot::snapshot_path(dir).display().to_string(),
        saved_at: snap.map(|s| s.saved_at),
        entries: snap.map(|s| s.entries.as_slice()).unwrap_or_default(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize snapshot JSON")?
    );
    Ok(())
}

fn print_table(dir: &Path, snap: Option<SnapshotFile>) {
    let path = snapshot::snapshot_path(dir);
    let Some(snap) = snap else {
        println!("{} no snapshot at {}", "■".bright_black().bold(), path.display());
        return;
    };

    println!(
        "{} {} entries | saved {} | {}",
        "■".green().bold(),
        snap.entries.len(),
        format_time(snap.saved_at),
        path.display(),
    );
    if snap.entries.is_empty() {
        return;
    }

    let rows: Vec<EntryRow> = snap
        .entries
        .into_iter()
        .map(|entry| EntryRow {
            key: entry.key,
            updated: format_time(entry.last_updated),
            value: preview(&entry.value),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn preview(value: &serde_json::Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= VALUE_PREVIEW_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(VALUE_PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}
