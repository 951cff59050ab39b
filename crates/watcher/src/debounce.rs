//! Windowed aggregation of raw notifications
//!
//! Every notification for a path within one window collapses into a single
//! change carrying the OR of all flags seen. Each timer tick swaps the map
//! for an empty one and hands the batch to the pipeline.

use crate::pipeline::Pipeline;
use crate::source::RawEvent;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strata_core::Op;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One aggregated change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub op: Op,
}

/// Pending `path -> merged flags` for the current window
#[derive(Default)]
pub struct Aggregator {
    pending: Mutex<AHashMap<PathBuf, Op>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a notification into the window
    pub fn record(&self, raw: RawEvent) {
        *self.pending.lock().entry(raw.path).or_default() |= raw.op;
    }

    /// Swap out the window; changes come back ordered by path
    pub fn take(&self) -> Vec<Change> {
        let drained = std::mem::take(&mut *self.pending.lock());

        let mut changes: Vec<Change> = drained
            .into_iter()
            .map(|(path, op)| Change { path, op })
            .collect();
        changes.sort_unstable_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    /// Distinct paths pending
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Aggregator loop: raw queue -> window -> pipeline
///
/// On cancellation whatever is already queued is folded into the window,
/// then one forced flush runs before the loop returns.
pub(crate) async fn run_aggregator(
    mut raw_rx: mpsc::Receiver<RawEvent>,
    pipeline: Arc<Pipeline>,
    window: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => pipeline.flush().await,
            raw = raw_rx.recv() => match raw {
                Some(raw) => pipeline.aggregator.record(raw),
                None => break,
            },
        }
    }

    raw_rx.close();
    while let Ok(raw) = raw_rx.try_recv() {
        pipeline.aggregator.record(raw);
    }

    debug!(pending = pipeline.aggregator.len(), "Final flush");
    pipeline.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_path_merges_flags() {
        let agg = Aggregator::new();
        agg.record(RawEvent::new("/w/a", Op::CREATE));
        agg.record(RawEvent::new("/w/a", Op::WRITE));
        agg.record(RawEvent::new("/w/a", Op::WRITE));
        assert_eq!(agg.len(), 1);

        let batch = agg.take();
        assert_eq!(
            batch,
            vec![Change {
                path: PathBuf::from("/w/a"),
                op: Op::CREATE | Op::WRITE,
            }]
        );
        assert!(agg.is_empty());
    }

    #[test]
    fn test_distinct_paths_stay_separate() {
        let agg = Aggregator::new();
        agg.record(RawEvent::new("/w/b", Op::WRITE));
        agg.record(RawEvent::new("/w/a", Op::REMOVE));

        let paths: Vec<_> = agg.take().into_iter().map(|c| c.path).collect();
        assert_eq!(paths, vec![PathBuf::from("/w/a"), PathBuf::from("/w/b")]);
    }

    #[test]
    fn test_take_starts_new_window() {
        let agg = Aggregator::new();
        agg.record(RawEvent::new("/w/a", Op::CREATE));
        assert_eq!(agg.take().len(), 1);

        agg.record(RawEvent::new("/w/a", Op::WRITE));
        let second = agg.take();
        assert_eq!(second[0].op, Op::WRITE);
        assert!(agg.take().is_empty());
    }
}
