//! Ignore pattern matching for raw notifications
//!
//! Patterns are plain shell globs (`*`, `?`, `[...]`, `\` escapes) tested
//! against a path's final segment, in the order they were configured. A
//! leading `#` or `!` is an ordinary character. Separator-free patterns
//! only suppress paths that sit directly under a watch root; a nested
//! basename match ends the check with "not ignored". Existing configs
//! depend on that asymmetry, keep it.

use crate::config::ConfigError;
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// One compiled ignore pattern
struct Pattern {
    matcher: GlobMatcher,
    has_separator: bool,
}

/// Basename glob matcher
///
/// Pure and deterministic; safe to share between tasks.
pub struct IgnoreMatcher {
    /// Watch roots, without leading `./`
    roots: Vec<PathBuf>,

    /// Patterns in configuration order
    patterns: Vec<Pattern>,
}

impl IgnoreMatcher {
    /// Compile `patterns` for the given watch roots
    pub fn new<S: AsRef<str>>(roots: &[PathBuf], patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|raw| compile(raw.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            roots: roots.iter().map(|root| strip_cur_dir(root)).collect(),
            patterns,
        })
    }

    /// Check if a path should be dropped before aggregation
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(base) = path.file_name() else {
            return false;
        };
        let base = Path::new(base);

        for pattern in &self.patterns {
            if pattern.matcher.is_match(base) {
                if !pattern.has_separator && !self.at_watch_root(path) {
                    return false;
                }
                return true;
            }
        }

        false
    }

    /// Number of configured patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if no patterns are configured
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the path's parent is a watch root (or the path is a bare name)
    fn at_watch_root(&self, path: &Path) -> bool {
        let parent = match path.parent() {
            Some(parent) => strip_cur_dir(parent),
            None => return true,
        };
        parent.as_os_str().is_empty() || self.roots.iter().any(|root| *root == parent)
    }
}

fn compile(raw: &str) -> Result<Pattern, ConfigError> {
    let matcher = GlobBuilder::new(raw)
        .literal_separator(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: raw.to_string(),
            source,
        })?
        .compile_matcher();

    Ok(Pattern {
        matcher,
        has_separator: raw.contains(MAIN_SEPARATOR),
    })
}

/// `./a/b` and `a/b` name the same place
fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
