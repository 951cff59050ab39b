//! Shared utilities for CLI commands

use crate::ConfigArgs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use strata_core::SnapshotNode;
use strata_watcher::{FileEvent, WatchConfig};

/// Build the effective configuration: file first, then flags
pub fn load_config(args: &ConfigArgs) -> Result<WatchConfig> {
    let mut config = match &args.config {
        Some(path) => WatchConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => WatchConfig::default(),
    };

    if !args.paths.is_empty() {
        config.watch_paths = args.paths.clone();
    }
    if config.watch_paths.is_empty() {
        config.watch_paths.push(".".into());
    }
    config.ignore_patterns.extend(args.ignore.iter().cloned());
    if let Some(ms) = args.debounce_ms {
        config.debounce_ms = ms;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }

    let config = config.normalized();
    config.validate()?;
    Ok(config)
}

/// Format time as relative ("2 minutes ago")
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else {
        format!("{} days ago", seconds / 86400)
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Last 8 characters of a snapshot id (the random tail)
pub fn short_id(node: &SnapshotNode) -> String {
    let id = node.id.to_string();
    id[id.len().saturating_sub(8)..].to_string()
}

/// One event as a JSON object
pub fn event_json(event: &FileEvent) -> serde_json::Value {
    let meta = event.snapshot.get(&event.path);
    serde_json::json!({
        "path": event.path.display().to_string(),
        "op": event.op.to_string(),
        "snapshot": event.snapshot.id.to_string(),
        "parent": event.snapshot.parent().map(|id| id.to_string()),
        "tracked_files": event.snapshot.len(),
        "size": meta.map(|m| m.size),
        "hash": meta.and_then(|m| m.hash).map(|h| h.to_hex()),
        "is_directory": meta.map(|m| m.is_directory),
    })
}

/// One event as a colored terminal line
pub fn event_line(event: &FileEvent) -> String {
    let detail = match event.snapshot.get(&event.path) {
        Some(meta) if meta.is_directory => "dir".to_string(),
        Some(meta) => format_size(meta.size),
        None => "gone".to_string(),
    };

    format!(
        "{} {:<14} {} {}",
        short_id(&event.snapshot).yellow(),
        event.op.to_string().cyan(),
        event.path.display(),
        format!("({})", detail).dimmed()
    )
}
