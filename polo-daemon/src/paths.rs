use std::time::Duration;

/// Default period of the configuration watcher.
pub const CONFIG_WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// How often the log file size is checked for rotation.
pub const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

/// Longest time `TaskQueue::enqueue` waits for a free slot.
pub const ENQUEUE_WAIT: Duration = Duration::from_secs(1);

/// Upper bound on live sources held by the task queue.
pub const QUEUE_CAPACITY: usize = 65_536;

/// Default log file name when `--log-file` points at a directory.
pub const DAEMON_LOG: &str = "polo.log";
