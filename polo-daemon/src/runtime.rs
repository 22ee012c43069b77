use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use polo_core::{locate::SearchRoots, types::DEFAULT_MAX_ENTRIES, ConfigHandle, Configuration};
use polo_store::{LoadOutcome, SaveOutcome, Store};

use crate::check::SourceCheck;
use crate::error::{io_err, DaemonError};
use crate::paths::{CONFIG_WATCH_INTERVAL, DAEMON_LOG, LOG_ROTATION_INTERVAL};
use crate::pool::{default_worker_count, PoolStats, WorkerContext, WorkerPool};
use crate::probe::FileProbe;
use crate::queue::{QueueError, Task, TaskQueue};
use crate::watcher::{ConfigWatcher, ReloadOutcome};

/// Options supplied by the command line.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub config_path: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    /// Period of the configuration watcher; one minute when unset.
    pub watch_interval: Option<Duration>,
}

impl DaemonOptions {
    /// The log file to write, with `polo.log` appended when `log_file` names
    /// an existing directory.
    pub fn log_path(&self) -> Option<PathBuf> {
        let path = self.log_file.as_ref()?;
        if path.is_dir() {
            return Some(path.join(DAEMON_LOG));
        }
        Some(path.clone())
    }
}

/// What the daemon did before it exited.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workers: usize,
    pub stats: PoolStats,
    /// `None` when the final save failed; the error was logged.
    pub saved: Option<SaveOutcome>,
}

/// Install tracing, build the runtime, and run with the built-in file probe
/// until interrupted.
pub fn start_blocking(options: DaemonOptions) -> Result<RunSummary, DaemonError> {
    crate::logging::init_tracing(options.verbose, options.log_path().as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options, Arc::new(FileProbe)))
}

/// Run until ctrl-c or SIGTERM.
pub async fn run<C: SourceCheck>(
    options: DaemonOptions,
    check: Arc<C>,
) -> Result<RunSummary, DaemonError> {
    let signal = termination_signal()?;
    run_until(options, check, signal).await
}

/// Run until `shutdown` completes.
///
/// Startup: store load → first configuration load → seed one task per source
/// → workers → watcher, flush and rotation loops. Shutdown: stop the loops,
/// close the queue, wait for in-flight checks, prune, save.
pub async fn run_until<C, F>(
    options: DaemonOptions,
    check: Arc<C>,
    shutdown: F,
) -> Result<RunSummary, DaemonError>
where
    C: SourceCheck,
    F: Future<Output = ()>,
{
    let store = Arc::new(open_store(&options).await);

    let handle = ConfigHandle::default();
    let mut watcher = ConfigWatcher::new(
        SearchRoots::from_env(options.config_path.clone()),
        handle.clone(),
    );
    watcher.poll_once().await;
    let config = handle.current();
    store.set_max_entries(config.settings.max_entries);
    store.prune();

    let queue = Arc::new(TaskQueue::new());
    seed_sources(&queue, &config).await;

    let workers = options
        .workers
        .or(config.settings.workers)
        .unwrap_or_else(default_worker_count);
    let pool = WorkerPool::start(
        workers,
        WorkerContext {
            queue: Arc::clone(&queue),
            store: Arc::clone(&store),
            config: handle.clone(),
            check,
        },
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let watcher_handle = {
        let rx = shutdown_tx.subscribe();
        let queue = Arc::clone(&queue);
        let store = Arc::clone(&store);
        let interval = options.watch_interval.unwrap_or(CONFIG_WATCH_INTERVAL);
        let pinned_workers = options.workers.is_some();
        tokio::spawn(async move {
            watcher_task(watcher, queue, store, interval, workers, pinned_workers, rx).await
        })
    };

    let flush_handle = {
        let rx = shutdown_tx.subscribe();
        let store = Arc::clone(&store);
        let handle = handle.clone();
        tokio::spawn(async move { flush_task(store, handle, rx).await })
    };

    let rotation_handle = options.log_path().map(|log| {
        let rx = shutdown_tx.subscribe();
        tokio::spawn(async move { log_rotation_task(log, rx).await })
    });

    tracing::info!(
        workers,
        sources = config.sources.len(),
        storage = %options
            .storage_dir
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        "polo daemon running",
    );

    shutdown.await;
    tracing::info!("shutdown requested");

    let _ = shutdown_tx.send(());
    let discarded = queue.close();
    tracing::debug!(discarded, "task queue closed, waiting for workers");
    let stats = pool.join().await;

    handle_join("config_watcher", watcher_handle.await);
    handle_join("store_flush", flush_handle.await);
    if let Some(rotation) = rotation_handle {
        handle_join("log_rotation", rotation.await);
    }

    store.prune();
    let saved = final_save(Arc::clone(&store)).await;
    tracing::info!(
        checks = stats.checks,
        failures = stats.failures,
        timeouts = stats.timeouts,
        "polo daemon stopped",
    );

    Ok(RunSummary {
        workers,
        stats,
        saved,
    })
}

async fn open_store(options: &DaemonOptions) -> Store {
    let Some(dir) = options.storage_dir.clone() else {
        tracing::warn!("no storage path configured, store will not be persisted");
        return Store::new(DEFAULT_MAX_ENTRIES);
    };

    let opened = tokio::task::spawn_blocking({
        let dir = dir.clone();
        move || {
            // Saves create the directory too, so a failure here is retried by
            // every flush.
            if let Err(err) = std::fs::create_dir_all(&dir) {
                tracing::warn!(
                    path = %dir.display(),
                    error = %err,
                    "storage directory unavailable, will retry at next flush",
                );
            }
            let store = Store::with_storage_dir(&dir, DEFAULT_MAX_ENTRIES);
            let loaded = store.load();
            (store, loaded)
        }
    })
    .await;

    let (store, loaded) = match opened {
        Ok(opened) => opened,
        Err(err) => {
            tracing::error!(error = %err, "store load task join failure, starting empty");
            let store = Store::with_storage_dir(&dir, DEFAULT_MAX_ENTRIES);
            store.preserve_existing_snapshot();
            return store;
        }
    };

    match loaded {
        Ok(LoadOutcome::Loaded { entries, evicted }) => {
            tracing::info!(path = %dir.display(), entries, evicted, "store restored");
        }
        Ok(LoadOutcome::NoSnapshot) => {
            tracing::info!(path = %dir.display(), "no store snapshot yet, starting empty");
        }
        Ok(LoadOutcome::Skipped { .. }) => {}
        Err(err) => {
            tracing::warn!(
                path = %dir.display(),
                error = %err,
                "store snapshot unreadable, starting empty; it will be kept aside on first save",
            );
        }
    }
    store
}

/// Queue a first task for every configured source that has none yet.
async fn seed_sources(queue: &TaskQueue, config: &Configuration) -> usize {
    let mut seeded = 0;
    for id in config.source_ids() {
        match queue.enqueue(Task::now(id.clone())).await {
            Ok(()) => seeded += 1,
            Err(QueueError::Duplicate(_)) => {}
            Err(QueueError::Closed) => break,
            Err(err) => tracing::warn!(source = %id, error = %err, "could not schedule source"),
        }
    }
    if seeded > 0 {
        tracing::debug!(seeded, "sources scheduled");
    }
    seeded
}

async fn watcher_task(
    mut watcher: ConfigWatcher,
    queue: Arc<TaskQueue>,
    store: Arc<Store>,
    interval: Duration,
    workers: usize,
    pinned_workers: bool,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the first load already happened during startup

    let mut current = watcher.handle().current();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let ReloadOutcome::Reloaded(next) = watcher.poll_once().await else {
                    continue;
                };
                apply_reload(&queue, &store, &current, &next, workers, pinned_workers).await;
                current = next;
            }
        }
    }
    watcher.stop();
}

async fn apply_reload(
    queue: &TaskQueue,
    store: &Store,
    previous: &Configuration,
    next: &Configuration,
    workers: usize,
    pinned_workers: bool,
) {
    store.set_max_entries(next.settings.max_entries);

    for id in next.source_ids().filter(|id| !previous.contains_source(id)) {
        tracing::info!(source = %id, "source added");
    }
    for id in previous.source_ids().filter(|id| !next.contains_source(id)) {
        tracing::info!(source = %id, "source removed, retiring after its current task");
    }
    seed_sources(queue, next).await;

    if let Some(wanted) = next.settings.workers {
        if !pinned_workers && wanted != workers {
            tracing::warn!(
                running = workers,
                configured = wanted,
                "worker count change takes effect after restart",
            );
        }
    }
}

async fn flush_task(store: Arc<Store>, config: ConfigHandle, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        // Re-read each round so a reloaded flush interval applies.
        let period = config.current().settings.flush_interval();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(period) => {
                store.prune();
                let store = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || store.save()).await {
                    Ok(Ok(SaveOutcome::Written { entries, .. })) => {
                        tracing::debug!(entries, "store flushed");
                    }
                    Ok(Ok(SaveOutcome::Skipped { .. })) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "store flush failed, retrying at next flush");
                    }
                    Err(err) => tracing::error!(error = %err, "store flush task join failure"),
                }
            }
        }
    }
}

async fn log_rotation_task(log: PathBuf, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(LOG_ROTATION_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let log = log.clone();
                // Failures are logged inside rotate_log.
                let _ = tokio::task::spawn_blocking(move || crate::log_rotation::rotate_log(&log)).await;
            }
        }
    }
}

async fn final_save(store: Arc<Store>) -> Option<SaveOutcome> {
    let saved = match tokio::task::spawn_blocking(move || store.save()).await {
        Ok(saved) => saved,
        Err(err) => {
            tracing::error!(error = %err, "final store save task join failure");
            return None;
        }
    };

    match saved {
        Ok(SaveOutcome::Written { path, entries }) => {
            tracing::info!(path = %path.display(), entries, "store saved");
            Some(SaveOutcome::Written { path, entries })
        }
        Ok(SaveOutcome::Skipped { reason }) => {
            tracing::info!(%reason, "store not saved");
            Some(SaveOutcome::Skipped { reason })
        }
        Err(err) => {
            tracing::error!(error = %err, "final store save failed");
            None
        }
    }
}

#[cfg(unix)]
fn termination_signal() -> Result<impl Future<Output = ()>, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).map_err(|e| DaemonError::Signal(e.to_string()))?;
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| DaemonError::Signal(e.to_string()))?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("received SIGINT"),
            _ = terminate.recv() => tracing::info!("received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn termination_signal() -> Result<impl Future<Output = ()>, DaemonError> {
    Ok(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "ctrl-c handler failed, shutting down");
        }
    })
}

fn handle_join(task: &'static str, result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        let err = DaemonError::Join {
            task,
            message: err.to_string(),
        };
        tracing::error!(error = %err, "background task ended abnormally");
    }
}
