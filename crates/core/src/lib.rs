//! Strata Core - versioned snapshots of tracked-file state
//!
//! This crate provides the storage layer used by the watcher engine:
//! - BLAKE3 content hashing
//! - Per-file metadata capture
//! - Operation flags for merged change notifications
//! - Immutable snapshot nodes and the in-memory version store

pub mod hash;
pub mod metadata;
pub mod op;
pub mod snapshot;
pub mod store;

// Re-export main types for convenience
pub use hash::{hash_bytes, hash_file, Blake3Hash};
pub use metadata::FileMetadata;
pub use op::Op;
pub use snapshot::{ParseSnapshotIdError, SnapshotId, SnapshotNode};
pub use store::{FileEdit, VersionStore};

/// Common result type used throughout strata-core
pub type Result<T> = anyhow::Result<T>;
