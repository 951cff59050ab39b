//! Per-file metadata captured for snapshots

use crate::hash::{hash_file, Blake3Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Metadata of one tracked path in one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Full path as reported by the event source
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time reported by the filesystem
    pub mod_time: DateTime<Utc>,
    /// Content digest; `None` for directories and for files that failed to hash
    pub hash: Option<Blake3Hash>,
    /// Whether the path is a directory
    pub is_directory: bool,
    /// When this record was built
    pub created_at: DateTime<Utc>,
    /// Same as `mod_time`
    pub last_modified: DateTime<Utc>,
}

impl FileMetadata {
    /// Build metadata from a stat result, hashing regular files.
    ///
    /// A hash failure is logged and leaves `hash` empty.
    pub fn capture(path: &Path, stat: &fs::Metadata) -> Self {
        let is_directory = stat.is_dir();
        let hash = if stat.is_file() {
            match hash_file(path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!("Error hashing file {}: {:#}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let mod_time = stat
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Self {
            path: path.to_path_buf(),
            size: stat.len(),
            mod_time,
            hash,
            is_directory,
            created_at: Utc::now(),
            last_modified: mod_time,
        }
    }
}

/// Result of stat-ing a changed path
#[derive(Debug)]
pub enum PathState {
    /// Path exists
    Present(fs::Metadata),
    /// Path does not exist
    Missing,
}

/// Stat a path, folding "not found" into [`PathState::Missing`].
///
/// Any other error is returned to the caller.
pub fn stat_path(path: &Path) -> io::Result<PathState> {
    match fs::metadata(path) {
        Ok(meta) => Ok(PathState::Present(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathState::Missing),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    #[test]
    fn test_capture_regular_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hi")?;

        let stat = fs::metadata(&path)?;
        let meta = FileMetadata::capture(&path, &stat);
        assert_eq!(meta.path, path);
        assert_eq!(meta.size, 2);
        assert!(!meta.is_directory);
        assert_eq!(meta.hash, Some(hash_bytes(b"hi")));
        assert_eq!(meta.mod_time, meta.last_modified);
        Ok(())
    }

    #[test]
    fn test_capture_directory_has_no_hash() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sub = dir.path().join("sub");
        fs::create_dir(&sub)?;

        let meta = FileMetadata::capture(&sub, &fs::metadata(&sub)?);
        assert!(meta.is_directory);
        assert!(meta.hash.is_none());
        Ok(())
    }

    #[test]
    fn test_stat_missing_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let state = stat_path(&dir.path().join("gone"))?;
        assert!(matches!(state, PathState::Missing));
        Ok(())
    }
}
