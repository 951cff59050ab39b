//! Snapshot nodes: complete, immutable views of tracked-file state

use crate::metadata::FileMetadata;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

const ID_PREFIX: &str = "snap-";

/// Unique, time-ordered snapshot identifier
///
/// Ids are allocated from a monotonic ULID generator, so ordering ids
/// orders snapshots by creation.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SnapshotId(Ulid);

impl SnapshotId {
    /// Wrap a ULID
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Underlying ULID
    pub fn ulid(&self) -> Ulid {
        self.0
    }

    /// Creation time encoded in the id (milliseconds since the Unix epoch)
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ID_PREFIX, self.0)
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self)
    }
}

/// Error parsing a [`SnapshotId`]
#[derive(Debug, Error)]
#[error("invalid snapshot id {input:?}: {source}")]
pub struct ParseSnapshotIdError {
    input: String,
    #[source]
    source: ulid::DecodeError,
}

impl FromStr for SnapshotId {
    type Err = ParseSnapshotIdError;

    /// Accepts both `snap-<ULID>` and a bare ULID
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(ID_PREFIX).unwrap_or(s);
        Ulid::from_string(raw)
            .map(SnapshotId)
            .map_err(|source| ParseSnapshotIdError {
                input: s.to_string(),
                source,
            })
    }
}

impl Serialize for SnapshotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SnapshotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One version of the tracked tree
///
/// `files` is the full mapping at this version, never a delta against the
/// parent. Nodes are shared behind `Arc` once stored and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Unique id
    pub id: SnapshotId,
    /// Parent ids; empty for the root, one entry otherwise
    pub parent_ids: Vec<SnapshotId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Human-readable summary of the change that produced this node
    pub description: String,
    /// Every tracked path at this version
    pub files: AHashMap<PathBuf, FileMetadata>,
}

impl SnapshotNode {
    /// The empty root snapshot
    pub fn root(id: SnapshotId) -> Self {
        Self {
            id,
            parent_ids: Vec::new(),
            created_at: Utc::now(),
            description: "Initial snapshot".to_string(),
            files: AHashMap::new(),
        }
    }

    /// Whether this node is a root (has no parent)
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// The single parent of a non-root node
    pub fn parent(&self) -> Option<SnapshotId> {
        self.parent_ids.first().copied()
    }

    /// Look up a tracked path
    pub fn get(&self, path: &Path) -> Option<&FileMetadata> {
        self.files.get(path)
    }

    /// Whether a path is tracked at this version
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Number of tracked paths
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if no paths are tracked
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
