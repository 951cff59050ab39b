//! Outward event feed

use std::path::PathBuf;
use std::sync::Arc;
use strata_core::{Op, SnapshotNode};
use tokio::sync::mpsc;
use tracing::debug;

/// One processed change and the snapshot it produced
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub op: Op,
    pub snapshot: Arc<SnapshotNode>,
}

/// Consumer end of the feed; ends once the engine has stopped
pub type EventFeed = mpsc::Receiver<FileEvent>;

/// Producer end of the bounded feed
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<FileEvent>,
}

impl EventEmitter {
    /// Bounded feed of `capacity` events
    pub fn channel(capacity: usize) -> (Self, EventFeed) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Publish an event, waiting while the feed is full
    ///
    /// Once the consumer has dropped the feed this only logs.
    pub async fn emit(&self, event: FileEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event).await {
            debug!(path = %event.path.display(), "Event feed closed; event dropped");
        }
    }

    /// Whether the consumer has dropped the feed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
