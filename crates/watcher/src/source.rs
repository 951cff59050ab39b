//! Raw notification sources
//!
//! An [`EventSource`] yields `{path, op}` notifications and source-internal
//! errors on one stream, and accepts new directory registrations. The
//! reader task pulls from the source, filters ignored paths, registers
//! freshly created directories and feeds the bounded raw queue.

use crate::ignore::IgnoreMatcher;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::Op;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// One raw filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub op: Op,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Notification or source-internal error
pub type SourceMessage = Result<RawEvent>;

/// Supplier of raw notifications
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Register one directory (non-recursively)
    fn watch(&mut self, dir: &Path) -> Result<()>;

    /// Next notification; `None` once the source is exhausted
    async fn next(&mut self) -> Option<SourceMessage>;

    /// Next already-buffered notification, without waiting
    fn try_next(&mut self) -> Option<SourceMessage>;
}

/// Source backed by the platform's native watcher
pub struct NotifySource {
    watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<SourceMessage>,
}

impl NotifySource {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Send only fails once the source itself is gone
            match res {
                Ok(event) => {
                    for raw in map_event(&event) {
                        let _ = tx.send(Ok(raw));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(anyhow::Error::new(e)));
                }
            }
        })
        .context("Failed to create watcher")?;

        Ok(Self { watcher, rx })
    }
}

#[async_trait]
impl EventSource for NotifySource {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))
    }

    async fn next(&mut self) -> Option<SourceMessage> {
        self.rx.recv().await
    }

    fn try_next(&mut self) -> Option<SourceMessage> {
        self.rx.try_recv().ok()
    }
}

/// Translate one notify event into per-path notifications
pub fn map_event(event: &Event) -> Vec<RawEvent> {
    let every = |op: Op| -> Vec<RawEvent> {
        event
            .paths
            .iter()
            .map(|path| RawEvent::new(path.clone(), op))
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => every(Op::CREATE),
        EventKind::Modify(ModifyKind::Metadata(_)) => every(Op::CHMOD),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => every(Op::CREATE),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut out = Vec::with_capacity(event.paths.len());
            for (i, path) in event.paths.iter().enumerate() {
                let op = if i == 0 { Op::RENAME } else { Op::CREATE };
                out.push(RawEvent::new(path.clone(), op));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => every(Op::RENAME),
        EventKind::Modify(_) => every(Op::WRITE),
        EventKind::Remove(_) => every(Op::REMOVE),
        EventKind::Any => every(Op::WRITE),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// In-memory source driven through a [`ManualHandle`]
pub struct ManualSource {
    rx: mpsc::UnboundedReceiver<SourceMessage>,
    shared: Arc<Mutex<ManualShared>>,
}

#[derive(Default)]
struct ManualShared {
    watched: Vec<PathBuf>,
    failing: Vec<PathBuf>,
}

/// Injects notifications into a [`ManualSource`] and inspects its registrations
#[derive(Clone)]
pub struct ManualHandle {
    tx: mpsc::UnboundedSender<SourceMessage>,
    shared: Arc<Mutex<ManualShared>>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(ManualShared::default()));
        let source = Self {
            rx,
            shared: Arc::clone(&shared),
        };
        (source, ManualHandle { tx, shared })
    }
}

#[async_trait]
impl EventSource for ManualSource {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.failing.iter().any(|p| p == dir) {
            return Err(anyhow!("Failed to watch directory: {}", dir.display()));
        }
        shared.watched.push(dir.to_path_buf());
        Ok(())
    }

    async fn next(&mut self) -> Option<SourceMessage> {
        self.rx.recv().await
    }

    fn try_next(&mut self) -> Option<SourceMessage> {
        self.rx.try_recv().ok()
    }
}

impl ManualHandle {
    /// Inject a notification; false once the source is dropped
    pub fn push(&self, path: impl Into<PathBuf>, op: Op) -> bool {
        self.tx.send(Ok(RawEvent::new(path, op))).is_ok()
    }

    /// Inject a source-internal error
    pub fn push_error(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(anyhow!(message.into()))).is_ok()
    }

    /// Directories registered so far, in registration order
    pub fn watched(&self) -> Vec<PathBuf> {
        self.shared.lock().watched.clone()
    }

    /// Make future registrations of `dir` fail
    pub fn fail_watch(&self, dir: impl Into<PathBuf>) {
        self.shared.lock().failing.push(dir.into());
    }
}

/// Reader loop: source -> ignore filter -> raw queue
///
/// On cancellation, notifications the source already buffered are still
/// forwarded before the loop exits.
pub(crate) async fn run_reader(
    mut source: Box<dyn EventSource>,
    ignore: Arc<IgnoreMatcher>,
    raw_tx: mpsc::Sender<RawEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = source.next() => message,
        };

        let Some(message) = message else {
            debug!("Event source closed");
            return;
        };

        if !forward(&mut *source, &ignore, &raw_tx, message).await {
            return;
        }
    }

    while let Some(message) = source.try_next() {
        if !forward(&mut *source, &ignore, &raw_tx, message).await {
            return;
        }
    }
    debug!("Reader stopped");
}

/// Handle one message; false when the raw queue is closed
async fn forward(
    source: &mut dyn EventSource,
    ignore: &IgnoreMatcher,
    raw_tx: &mpsc::Sender<RawEvent>,
    message: SourceMessage,
) -> bool {
    let raw = match message {
        Ok(raw) => raw,
        Err(e) => {
            error!("Watch error: {:#}", e);
            return true;
        }
    };

    if ignore.is_ignored(&raw.path) {
        trace!(path = %raw.path.display(), "Ignored");
        return true;
    }

    if raw.op.contains(Op::CREATE) {
        if let Ok(meta) = tokio::fs::metadata(&raw.path).await {
            if meta.is_dir() {
                if let Err(e) = source.watch(&raw.path) {
                    warn!("Failed to watch new directory {}: {:#}", raw.path.display(), e);
                }
            }
        }
    }

    // Blocks while the queue is full
    raw_tx.send(raw).await.is_ok()
}
