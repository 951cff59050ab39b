//! In-memory version store: every snapshot plus the head pointer

use crate::metadata::{stat_path, FileMetadata, PathState};
use crate::op::Op;
use crate::snapshot::{SnapshotId, SnapshotNode};
use ahash::AHashMap;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use ulid::{Generator, Ulid};

/// Edit applied to the copied file mapping of a new snapshot
#[derive(Debug, Clone)]
pub enum FileEdit {
    /// Insert or replace the path's metadata
    Upsert(FileMetadata),
    /// Drop the path
    Remove,
    /// Leave the mapping as copied
    Unchanged,
}

/// Version store for one engine
///
/// Holds every snapshot ever produced and the current head. Readers share
/// the lock; producing a snapshot takes it exclusively. Snapshots are never
/// garbage collected.
pub struct VersionStore {
    state: RwLock<StoreState>,
}

struct StoreState {
    snapshots: AHashMap<SnapshotId, Arc<SnapshotNode>>,
    head: Arc<SnapshotNode>,
    ids: Generator,
}

impl StoreState {
    /// Allocate an id strictly greater than the current head's
    fn next_id(&mut self) -> SnapshotId {
        let last = self.head.id.ulid();
        let next = match self.ids.generate() {
            Ok(ulid) if ulid > last => ulid,
            // Clock went backwards or the generator overflowed this millisecond
            _ => last
                .increment()
                .unwrap_or_else(|| Ulid::from_parts(last.timestamp_ms() + 1, 0)),
        };
        SnapshotId::from_ulid(next)
    }
}

#[allow(clippy::len_without_is_empty)]
impl VersionStore {
    /// Create a store holding only the empty root snapshot
    pub fn new() -> Self {
        let mut ids = Generator::new();
        let root_id = SnapshotId::from_ulid(ids.generate().unwrap_or_else(|_| Ulid::new()));
        let root = Arc::new(SnapshotNode::root(root_id));

        let mut snapshots = AHashMap::new();
        snapshots.insert(root_id, Arc::clone(&root));

        Self {
            state: RwLock::new(StoreState {
                snapshots,
                head: root,
                ids,
            }),
        }
    }

    /// Process one aggregated change into a new snapshot.
    ///
    /// Stat and hashing happen before the lock is taken. A stat failure
    /// other than "not found" is returned and no snapshot is produced.
    pub fn record_change(&self, path: &Path, op: Op) -> Result<Arc<SnapshotNode>> {
        let state = stat_path(path)
            .with_context(|| format!("Error stating file: {}", path.display()))?;

        let edit = match state {
            PathState::Missing if op.is_removal() => FileEdit::Remove,
            PathState::Missing => FileEdit::Unchanged,
            PathState::Present(stat) => FileEdit::Upsert(FileMetadata::capture(path, &stat)),
        };

        Ok(self.commit(path, op, edit))
    }

    /// Derive a new head from the current one with a single edit applied.
    ///
    /// The parent's whole file mapping is copied while the exclusive lock
    /// is held, so cost grows with the number of tracked files and all
    /// readers wait for it. The edit lands before the node is published;
    /// stored nodes are never touched again.
    pub fn commit(&self, path: &Path, op: Op, edit: FileEdit) -> Arc<SnapshotNode> {
        let mut state = self.state.write();
        let parent = Arc::clone(&state.head);
        let id = state.next_id();

        let mut files = parent.files.clone();
        match edit {
            FileEdit::Upsert(meta) => {
                files.insert(path.to_path_buf(), meta);
            }
            FileEdit::Remove => {
                files.remove(path);
            }
            FileEdit::Unchanged => {}
        }

        let node = Arc::new(SnapshotNode {
            id,
            parent_ids: vec![parent.id],
            created_at: Utc::now(),
            description: format!("Snapshot after {} on {}", op, path.display()),
            files,
        });

        state.snapshots.insert(id, Arc::clone(&node));
        state.head = Arc::clone(&node);
        node
    }

    /// Current head snapshot
    pub fn current(&self) -> Arc<SnapshotNode> {
        Arc::clone(&self.state.read().head)
    }

    /// Snapshot by id
    pub fn get(&self, id: &SnapshotId) -> Option<Arc<SnapshotNode>> {
        self.state.read().snapshots.get(id).cloned()
    }

    /// Every stored snapshot, oldest first
    pub fn list(&self) -> Vec<Arc<SnapshotNode>> {
        let mut all: Vec<_> = self.state.read().snapshots.values().cloned().collect();
        all.sort_unstable_by_key(|node| node.id);
        all
    }

    /// Number of stored snapshots; never zero, the root always exists
    pub fn len(&self) -> usize {
        self.state.read().snapshots.len()
    }

    /// Chain from `id` back to the root, `id` first
    ///
    /// Empty if `id` is unknown.
    pub fn ancestry(&self, id: &SnapshotId) -> Vec<Arc<SnapshotNode>> {
        let state = self.state.read();
        let mut chain = Vec::new();
        let mut cursor = state.snapshots.get(id).cloned();
        while let Some(node) = cursor {
            cursor = node.parent().and_then(|p| state.snapshots.get(&p).cloned());
            chain.push(node);
        }
        chain
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}
