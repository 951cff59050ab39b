//! Watcher configuration
//!
//! Loaded from TOML or built in code. Every field except `watch_paths` has
//! a default; zero values fall back to the defaults.

use crate::ignore::IgnoreMatcher;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default aggregation window
pub const DEFAULT_DEBOUNCE_MS: u64 = 10;
/// Default number of concurrent change-processing tasks
pub const DEFAULT_WORKER_COUNT: usize = 32;
/// Default bound of the raw notification queue
pub const DEFAULT_RAW_QUEUE_CAPACITY: usize = 100_000;
/// Default bound of the outward event feed
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 20_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No roots to watch
    #[error("at least one watch path is required")]
    NoWatchPaths,

    /// An ignore pattern failed to compile
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Config file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Roots registered recursively with the event source
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,

    /// Basename glob patterns to ignore
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Aggregation window in milliseconds (default: 10)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Max concurrent change-processing tasks (default: 32)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Raw notification queue bound (default: 100000)
    #[serde(default = "default_raw_queue_capacity")]
    pub raw_queue_capacity: usize,

    /// Outward event feed bound (default: 20000)
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl WatchConfig {
    /// Config watching the given roots with all defaults
    pub fn new<I, P>(watch_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            watch_paths: watch_paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the ignore patterns
    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the aggregation window, rounded up to whole milliseconds
    ///
    /// Only `Duration::ZERO` maps to 0 (and so to the default window).
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        let millis = debounce.as_nanos().div_ceil(1_000_000);
        self.debounce_ms = millis.try_into().unwrap_or(u64::MAX);
        self
    }

    /// Set the worker count
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the outward feed bound
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Aggregation window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Replace zero values with defaults
    pub fn normalized(mut self) -> Self {
        if self.debounce_ms == 0 {
            self.debounce_ms = DEFAULT_DEBOUNCE_MS;
        }
        if self.worker_count == 0 {
            self.worker_count = DEFAULT_WORKER_COUNT;
        }
        if self.raw_queue_capacity == 0 {
            self.raw_queue_capacity = DEFAULT_RAW_QUEUE_CAPACITY;
        }
        if self.event_queue_capacity == 0 {
            self.event_queue_capacity = DEFAULT_EVENT_QUEUE_CAPACITY;
        }
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch_paths.is_empty() {
            return Err(ConfigError::NoWatchPaths);
        }
        IgnoreMatcher::new(&self.watch_paths, &self.ignore_patterns)?;
        Ok(())
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            ignore_patterns: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            worker_count: DEFAULT_WORKER_COUNT,
            raw_queue_capacity: DEFAULT_RAW_QUEUE_CAPACITY,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_raw_queue_capacity() -> usize {
    DEFAULT_RAW_QUEUE_CAPACITY
}

fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}
