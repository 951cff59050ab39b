//! Watch directories and stream snapshot events

use crate::util;
use crate::ConfigArgs;
use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;
use strata_watcher::{FileEvent, Watcher};
use tracing::info;

pub async fn run(args: &ConfigArgs, json: bool) -> Result<()> {
    let config = util::load_config(args)?;
    let mut watcher = Watcher::new(config)?;
    let mut events = watcher.take_events().context("Event feed already taken")?;

    watcher.start().context("Failed to start watcher")?;

    if !json {
        println!("{}", "Watching".bold());
        for path in &watcher.config().watch_paths {
            println!("  {}", path.display().to_string().cyan());
        }
        println!("  {}", "Press Ctrl-C to stop".dimmed());
        println!();
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, flushing pending changes");
                break;
            }
            event = events.recv() => match event {
                Some(event) => print_event(&event, json)?,
                None => break,
            },
        }
    }

    // Final flush: keep reading while stopping so a full feed cannot stall it
    {
        let stop = watcher.stop();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                () = &mut stop => break,
                Some(event) = events.recv() => print_event(&event, json)?,
            }
        }
    }
    while let Some(event) = events.recv().await {
        print_event(&event, json)?;
    }

    if !json {
        print_summary(&watcher);
    }
    Ok(())
}

fn print_event(event: &FileEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(&util::event_json(event))?;
        println!("{}", line);
    } else {
        println!("{}", util::event_line(event));
    }
    Ok(())
}

fn print_summary(watcher: &Watcher) {
    let head = watcher.current_snapshot();

    println!();
    println!("{}", "Summary".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Snapshots:     {}", watcher.snapshot_count());
    println!("Head:          {}", head.id.to_string().yellow());
    println!(
        "Created:       {}",
        util::format_relative_time(head.created_at, Utc::now()).dimmed()
    );
    println!("Tracked files: {}", head.len());
    println!("Description:   {}", head.description);
}
