//! Flush path: aggregated changes -> dispatcher -> store -> feed

use crate::debounce::{Aggregator, Change};
use crate::dispatch::Dispatcher;
use crate::emit::{EventEmitter, FileEvent};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::VersionStore;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// State shared by the aggregator loop and the engine during a run
pub(crate) struct Pipeline {
    pub(crate) aggregator: Aggregator,
    pub(crate) dispatcher: Dispatcher,
    order: Arc<PathOrder>,
    store: Arc<VersionStore>,
    emitter: EventEmitter,
}

impl Pipeline {
    pub(crate) fn new(store: Arc<VersionStore>, emitter: EventEmitter, worker_count: usize) -> Self {
        Self {
            aggregator: Aggregator::new(),
            dispatcher: Dispatcher::new(worker_count),
            order: Arc::new(PathOrder::default()),
            store,
            emitter,
        }
    }

    /// Swap out the current window and dispatch one task per path
    ///
    /// A path's task starts only after the same path's task from an earlier
    /// window has committed and emitted.
    pub(crate) async fn flush(&self) {
        let batch = self.aggregator.take();
        if batch.is_empty() {
            return;
        }

        debug!(changes = batch.len(), "Flushing window");
        for change in batch {
            let turn = self.order.enqueue(&change.path);
            let store = Arc::clone(&self.store);
            let emitter = self.emitter.clone();
            self.dispatcher.submit(process(store, emitter, change, turn)).await;
        }
    }
}

/// FIFO hand-off between tasks touching the same path
///
/// Each task holds the completion signal of its path's previous task.
/// Distinct paths never wait on each other.
#[derive(Default)]
pub(crate) struct PathOrder {
    /// Latest queued turn per path: ticket and its completion receiver
    tails: Mutex<AHashMap<PathBuf, (u64, oneshot::Receiver<()>)>>,
    next_ticket: Mutex<u64>,
}

/// A task's place in its path's queue; dropping it lets the next one run
pub(crate) struct Turn {
    order: Arc<PathOrder>,
    path: PathBuf,
    ticket: u64,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl PathOrder {
    /// Queue a turn behind whatever is already queued for `path`
    pub(crate) fn enqueue(self: &Arc<Self>, path: &Path) -> Turn {
        let ticket = {
            let mut next = self.next_ticket.lock();
            *next += 1;
            *next
        };
        let (done, finished) = oneshot::channel();
        let previous = self
            .tails
            .lock()
            .insert(path.to_path_buf(), (ticket, finished))
            .map(|(_, previous)| previous);

        Turn {
            order: Arc::clone(self),
            path: path.to_path_buf(),
            ticket,
            previous,
            _done: done,
        }
    }

    /// Paths with a queued or running turn
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.tails.lock().len()
    }
}

impl Turn {
    /// Wait until the previous turn for this path has been dropped
    pub(crate) async fn ready(&mut self) {
        if let Some(previous) = &mut self.previous {
            // The sender is never used; closing it is the signal
            let _ = previous.await;
            self.previous = None;
        }
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        let mut tails = self.order.tails.lock();
        if tails.get(&self.path).is_some_and(|(ticket, _)| *ticket == self.ticket) {
            tails.remove(&self.path);
        }
    }
}

/// Turn one change into a snapshot and publish it
async fn process(store: Arc<VersionStore>, emitter: EventEmitter, change: Change, mut turn: Turn) {
    turn.ready().await;
    let Change { path, op } = change;

    let result = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || store.record_change(&path, op)).await
    };

    match result {
        Ok(Ok(snapshot)) => {
            debug!(path = %path.display(), %op, snapshot = %snapshot.id, "Snapshot created");
            emitter.emit(FileEvent { path, op, snapshot }).await;
        }
        Ok(Err(e)) => warn!("Change to {} dropped: {:#}", path.display(), e),
        Err(e) => error!("Change task for {} failed: {}", path.display(), e),
    }
    drop(turn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawEvent;
    use strata_core::{hash_bytes, Op};

    #[tokio::test]
    async fn test_flush_snapshots_each_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"hi").unwrap();
        std::fs::write(&b, b"there").unwrap();

        let store = Arc::new(VersionStore::new());
        let (emitter, mut feed) = EventEmitter::channel(8);
        let pipeline = Pipeline::new(Arc::clone(&store), emitter, 2);

        pipeline.aggregator.record(RawEvent::new(&a, Op::CREATE));
        pipeline.aggregator.record(RawEvent::new(&a, Op::WRITE));
        pipeline.aggregator.record(RawEvent::new(&b, Op::CREATE));
        pipeline.flush().await;
        pipeline.dispatcher.wait_idle().await;
        drop(pipeline);

        let mut events = Vec::new();
        while let Some(event) = feed.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(store.len(), 3);

        let head = store.current();
        assert_eq!(head.get(&a).unwrap().hash, Some(hash_bytes(b"hi")));
        assert!(head.contains(&b));
        let a_event = events.iter().find(|e| e.path == a).unwrap();
        assert_eq!(a_event.op, Op::CREATE | Op::WRITE);
    }

    async fn drain(pipeline: Pipeline, mut feed: crate::emit::EventFeed) -> Vec<FileEvent> {
        pipeline.dispatcher.wait_idle().await;
        drop(pipeline);
        let mut events = Vec::new();
        while let Some(event) = feed.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_removal_after_slow_write_lands_last() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        std::fs::write(&big, vec![7u8; 32 << 20]).unwrap();

        let store = Arc::new(VersionStore::new());
        let (emitter, feed) = EventEmitter::channel(8);
        let pipeline = Pipeline::new(Arc::clone(&store), emitter, 4);

        // Window 1 hashes a large file; window 2 removes it while that runs
        pipeline.aggregator.record(RawEvent::new(&big, Op::WRITE));
        pipeline.flush().await;
        std::fs::remove_file(&big).unwrap();
        pipeline.aggregator.record(RawEvent::new(&big, Op::REMOVE));
        pipeline.flush().await;

        let events = drain(pipeline, feed).await;
        let ops: Vec<Op> = events.iter().map(|e| e.op).collect();
        assert_eq!(ops, vec![Op::WRITE, Op::REMOVE]);
        assert_eq!(events[1].snapshot.parent(), Some(events[0].snapshot.id));
        assert!(!store.current().contains(&big));
        assert_eq!(store.current().id, events[1].snapshot.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_windows_on_one_path_apply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("churn.txt");
        std::fs::write(&file, b"x").unwrap();

        let store = Arc::new(VersionStore::new());
        let (emitter, feed) = EventEmitter::channel(64);
        let pipeline = Pipeline::new(Arc::clone(&store), emitter, 8);

        for round in 0..20 {
            let op = if round % 2 == 0 { Op::WRITE } else { Op::CHMOD };
            pipeline.aggregator.record(RawEvent::new(&file, op));
            pipeline.flush().await;
        }

        let events = drain(pipeline, feed).await;
        assert_eq!(events.len(), 20);
        for (round, event) in events.iter().enumerate() {
            let expected = if round % 2 == 0 { Op::WRITE } else { Op::CHMOD };
            assert_eq!(event.op, expected, "round {}", round);
        }
        for pair in events.windows(2) {
            assert_eq!(pair[1].snapshot.parent(), Some(pair[0].snapshot.id));
        }
    }

    #[tokio::test]
    async fn test_turn_waits_for_previous_turn_on_same_path() {
        let order = Arc::new(PathOrder::default());
        let first = order.enqueue(Path::new("a"));
        let mut second = order.enqueue(Path::new("a"));
        let mut other = order.enqueue(Path::new("b"));
        assert_eq!(order.pending(), 2);

        // Different path: no waiting
        other.ready().await;

        let blocked = tokio::time::timeout(std::time::Duration::from_millis(20), second.ready()).await;
        assert!(blocked.is_err());

        drop(first);
        second.ready().await;

        drop(other);
        assert_eq!(order.pending(), 1);
        drop(second);
        assert_eq!(order.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_flush_dispatches_nothing() {
        let store = Arc::new(VersionStore::new());
        let (emitter, _feed) = EventEmitter::channel(1);
        let pipeline = Pipeline::new(Arc::clone(&store), emitter, 1);

        pipeline.flush().await;
        pipeline.dispatcher.wait_idle().await;
        assert_eq!(store.len(), 1);
    }
}
