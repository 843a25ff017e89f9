//! The `ortforge validate` command.

use std::path::PathBuf;

use anyhow::Result;

use ortforge_core::config::load_config_from;
use ortforge_core::engine::BatchEngine;
use ortforge_core::items::load_items;

use super::{summary_table, ConsoleReporter};

pub fn execute(
    items_path: PathBuf,
    format: String,
    report_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<i32> {
    let config = load_config_from(config_path.as_deref())?;
    let values = load_items(&items_path)?;
    tracing::info!("validating {} items from {}", values.len(), items_path.display());

    let engine = BatchEngine::new(config)?;
    let report = engine.validate_batch(&items_path.display().to_string(), &values, &ConsoleReporter);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => {
            print!("{}", report.render_text());
            println!("\n{}", summary_table(&report));
        }
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    }

    if let Some(path) = report_path {
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(if report.passed { 0 } else { 1 })
}
