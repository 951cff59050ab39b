//! Shared fixtures for watcher integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_watcher::{EventFeed, FileEvent, ManualHandle, ManualSource, WatchConfig, Watcher};
use tempfile::TempDir;

/// Upper bound for any single wait; time is paused in most tests
pub const WAIT: Duration = Duration::from_secs(60);

/// A started watcher over a temp directory, driven by a manual source
pub struct Harness {
    pub dir: TempDir,
    pub watcher: Watcher,
    pub events: EventFeed,
    pub source: ManualHandle,
}

impl Harness {
    pub fn start(debounce_ms: u64) -> Result<Self> {
        Self::start_with(|config| config.with_debounce(Duration::from_millis(debounce_ms)))
    }

    pub fn start_with(configure: impl FnOnce(WatchConfig) -> WatchConfig) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::start_in(dir, configure)
    }

    /// Start over an already populated directory
    pub fn start_in(dir: TempDir, configure: impl FnOnce(WatchConfig) -> WatchConfig) -> Result<Self> {
        let config = configure(WatchConfig::new([dir.path()]));
        let mut watcher = Watcher::new(config)?;
        let events = watcher.take_events().context("feed already taken")?;

        let (source, handle) = ManualSource::new();
        watcher.start_with(source)?;

        Ok(Self {
            dir,
            watcher,
            events,
            source: handle,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Next event, failing instead of hanging
    pub async fn next_event(&mut self) -> Result<FileEvent> {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .context("timed out waiting for event")?
            .context("event feed closed")
    }

    /// True if nothing arrives within `window`
    pub async fn quiet_for(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.events.recv()).await.is_err()
    }

    /// Stop the watcher while collecting everything left in the feed
    ///
    /// The feed is read concurrently with `stop`: the final flush can emit
    /// more events than the feed holds.
    pub async fn stop_and_drain(&mut self) -> Vec<FileEvent> {
        let events = &mut self.events;
        let drain = async move {
            let mut rest = Vec::new();
            while let Some(event) = events.recv().await {
                rest.push(event);
            }
            rest
        };
        let ((), rest) = tokio::join!(self.watcher.stop(), drain);
        rest
    }
}

pub fn paths(events: &[FileEvent]) -> Vec<&Path> {
    let mut paths: Vec<&Path> = events.iter().map(|e| e.path.as_path()).collect();
    paths.sort();
    paths
}
