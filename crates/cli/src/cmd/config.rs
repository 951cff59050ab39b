//! Show the effective configuration

use crate::util;
use crate::ConfigArgs;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = util::load_config(args)?;
    let rendered = toml::to_string(&config).context("Failed to render config")?;

    if let Some(path) = &args.config {
        println!("{}", format!("# loaded from {}", path.display()).dimmed());
    }
    print!("{}", rendered);
    Ok(())
}
