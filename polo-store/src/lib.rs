//! # polo-store
//!
//! The collector's working set: a bounded in-memory key/value map with
//! LRU-by-update pruning, persisted as an atomically replaced JSON snapshot.
//!
//! Build a [`Store`] with [`Store::with_storage_dir`], call [`Store::load`]
//! once at startup and [`Store::save`] on every flush.

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StoreError;
pub use snapshot::{SnapshotFile, SNAPSHOT_FILE_NAME};
pub use store::{LoadOutcome, SaveOutcome, SkipReason, Store, StoreEntry};
