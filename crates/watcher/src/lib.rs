//! File system watching for Strata
//!
//! This crate turns raw filesystem notifications into a linear history of
//! snapshots:
//! - Basename ignore patterns
//! - Windowed per-path aggregation (10ms by default)
//! - Bounded concurrent snapshot creation
//! - A bounded outward event feed that closes only after the final flush
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use strata_watcher::{WatchConfig, Watcher};
//!
//! let mut watcher = Watcher::new(WatchConfig::new(["./data"]))?;
//! let mut events = watcher.take_events().expect("feed is taken once");
//! watcher.start()?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{} {} -> {}", event.op, event.path.display(), event.snapshot.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod emit;
pub mod ignore;
pub mod source;

mod pipeline;

pub use config::{ConfigError, WatchConfig};
pub use emit::{EventFeed, FileEvent};
pub use crate::ignore::IgnoreMatcher;
pub use source::{EventSource, ManualHandle, ManualSource, NotifySource, RawEvent};

use anyhow::{bail, Context, Result};
use crate::pipeline::Pipeline;
use std::path::Path;
use std::sync::Arc;
use strata_core::{SnapshotId, SnapshotNode, VersionStore};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::emit::EventEmitter;

/// Snapshotting file system watcher
///
/// Owns all of its state; any number of watchers can run side by side.
pub struct Watcher {
    config: WatchConfig,
    ignore: Arc<IgnoreMatcher>,
    store: Arc<VersionStore>,

    /// Held until start hands it to the pipeline
    emitter: Option<EventEmitter>,
    feed: Option<EventFeed>,

    run: Option<Running>,
    started: bool,

    /// Parent of every background task's token
    shutdown: CancellationToken,
}

/// Background tasks of a started watcher
struct Running {
    reader_token: CancellationToken,
    reader: JoinHandle<()>,
    aggregator_token: CancellationToken,
    aggregator: JoinHandle<()>,
    pipeline: Arc<Pipeline>,
}

impl Watcher {
    /// Create a watcher holding only the empty root snapshot
    ///
    /// Zero-valued settings fall back to their defaults.
    pub fn new(config: WatchConfig) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;

        let ignore = IgnoreMatcher::new(&config.watch_paths, &config.ignore_patterns)?;
        let (emitter, feed) = EventEmitter::channel(config.event_queue_capacity);

        Ok(Self {
            config,
            ignore: Arc::new(ignore),
            store: Arc::new(VersionStore::new()),
            emitter: Some(emitter),
            feed: Some(feed),
            run: None,
            started: false,
            shutdown: CancellationToken::new(),
        })
    }

    /// Take the outward event feed; `None` after the first call
    pub fn take_events(&mut self) -> Option<EventFeed> {
        self.feed.take()
    }

    /// Effective configuration
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Check a path against the configured ignore patterns
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.is_ignored(path)
    }

    /// Whether background tasks are running
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Start watching with the platform's native notifications
    pub fn start(&mut self) -> Result<()> {
        self.ensure_startable()?;
        let source = NotifySource::new()?;
        self.start_with(source)
    }

    /// Start watching with the given notification source
    ///
    /// Registers every non-ignored directory under each root, then spawns
    /// the reader and aggregator tasks on the current tokio runtime. A root
    /// that cannot be walked fails the start; a directory that cannot be
    /// registered only logs a warning.
    pub fn start_with<S: EventSource>(&mut self, source: S) -> Result<()> {
        let runtime = self.ensure_startable()?;

        let mut source: Box<dyn EventSource> = Box::new(source);
        let mut registered = 0;
        for root in &self.config.watch_paths {
            registered += register_tree(&mut *source, root, &self.ignore)?;
        }

        let emitter = self
            .emitter
            .take()
            .context("Watcher was stopped before it started")?;
        self.started = true;

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&self.store),
            emitter,
            self.config.worker_count,
        ));
        let (raw_tx, raw_rx) = mpsc::channel(self.config.raw_queue_capacity);

        let reader_token = self.shutdown.child_token();
        let reader = runtime.spawn(source::run_reader(
            source,
            Arc::clone(&self.ignore),
            raw_tx,
            reader_token.clone(),
        ));

        let aggregator_token = self.shutdown.child_token();
        let aggregator = runtime.spawn(debounce::run_aggregator(
            raw_rx,
            Arc::clone(&pipeline),
            self.config.debounce(),
            aggregator_token.clone(),
        ));

        self.run = Some(Running {
            reader_token,
            reader,
            aggregator_token,
            aggregator,
            pipeline,
        });

        info!(
            roots = self.config.watch_paths.len(),
            directories = registered,
            debounce_ms = self.config.debounce_ms,
            workers = self.config.worker_count,
            "Watcher started"
        );
        Ok(())
    }

    /// Stop watching
    ///
    /// Stops the reader, folds anything still queued into a final flush,
    /// waits for every dispatched change to finish and only then closes the
    /// event feed. Safe to call more than once, or without `start`.
    ///
    /// Emission blocks while the feed is full, so a consumer that still
    /// holds the feed must keep reading it until `stop` returns (or drop
    /// it). Awaiting `stop` first and reading afterwards can wait forever
    /// once the final flush outgrows the feed's capacity:
    ///
    /// ```no_run
    /// # async fn demo(mut watcher: strata_watcher::Watcher, mut events: strata_watcher::EventFeed) {
    /// let drain = async move {
    ///     while let Some(event) = events.recv().await {
    ///         println!("{}", event.path.display());
    ///     }
    /// };
    /// tokio::join!(watcher.stop(), drain);
    /// # }
    /// ```
    pub async fn stop(&mut self) {
        // Never started: dropping the only sender ends the feed
        self.emitter = None;

        let Some(run) = self.run.take() else {
            return;
        };

        run.reader_token.cancel();
        if let Err(e) = run.reader.await {
            error!("Reader task failed: {}", e);
        }

        run.aggregator_token.cancel();
        if let Err(e) = run.aggregator.await {
            error!("Aggregator task failed: {}", e);
        }

        run.pipeline.dispatcher.wait_idle().await;
        drop(run.pipeline);

        info!(snapshots = self.store.len(), "Watcher stopped");
    }

    /// Current head snapshot
    pub fn current_snapshot(&self) -> Arc<SnapshotNode> {
        self.store.current()
    }

    /// Snapshot by id
    pub fn snapshot_by_id(&self, id: &SnapshotId) -> Option<Arc<SnapshotNode>> {
        self.store.get(id)
    }

    /// Every snapshot, oldest first
    pub fn list_all_snapshots(&self) -> Vec<Arc<SnapshotNode>> {
        self.store.list()
    }

    /// Number of stored snapshots
    pub fn snapshot_count(&self) -> usize {
        self.store.len()
    }

    /// Chain from `id` back to the root, `id` first
    pub fn ancestry(&self, id: &SnapshotId) -> Vec<Arc<SnapshotNode>> {
        self.store.ancestry(id)
    }

    fn ensure_startable(&self) -> Result<Handle> {
        if self.started {
            bail!("Watcher already started");
        }
        if self.emitter.is_none() {
            bail!("Watcher was stopped before it started");
        }
        Handle::try_current().context("Watcher must be started inside a tokio runtime")
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // In-flight change tasks run to completion on their own
        self.shutdown.cancel();
    }
}

/// Register `root` and every non-ignored directory below it
fn register_tree(source: &mut dyn EventSource, root: &Path, ignore: &IgnoreMatcher) -> Result<usize> {
    let mut registered = 0;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("Failed to walk watch root: {}", root.display()));
            }
            Err(e) => {
                warn!("Error walking {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }
        if ignore.is_ignored(entry.path()) {
            debug!(path = %entry.path().display(), "Skipping ignored directory");
            continue;
        }

        match source.watch(entry.path()) {
            Ok(()) => registered += 1,
            Err(e) => warn!("Failed to watch {}: {:#}", entry.path().display(), e),
        }
    }

    Ok(registered)
}
