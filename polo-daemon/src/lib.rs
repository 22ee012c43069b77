//! Polo daemon runtime: config watcher + task queue + worker pool + store flush.

mod error;
pub mod check;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod pool;
pub mod probe;
pub mod queue;
mod runtime;
pub mod watcher;

pub use check::{CheckError, CheckOutcome, SourceCheck};
pub use error::DaemonError;
pub use pool::{default_worker_count, next_delay, PoolStats, WorkerPool};
pub use probe::FileProbe;
pub use queue::{QueueError, Task, TaskQueue};
pub use runtime::{run, run_until, start_blocking, DaemonOptions, RunSummary};
pub use watcher::{ConfigWatcher, ReloadOutcome};
