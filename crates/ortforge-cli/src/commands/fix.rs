//! The `ortforge fix` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use ortforge_core::autofix::{apply_patch, Patch, PatchOp};
use ortforge_core::config::load_config_from;
use ortforge_core::items::{load_items_file, write_json};

use super::summary_table;

pub fn execute(
    items_path: PathBuf,
    ids: Vec<String>,
    assignments: Vec<String>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<i32> {
    anyhow::ensure!(!ids.is_empty(), "--ids must name at least one item");
    let config = load_config_from(config_path.as_deref())?;
    let validator = config.validator();

    let ops = assignments
        .iter()
        .map(|a| PatchOp::parse(a).with_context(|| format!("invalid --set value: {a}")))
        .collect::<Result<Vec<_>>>()?;
    let patch = Patch {
        ids: ids.iter().map(|id| id.trim().to_string()).collect(),
        ops,
    };

    let values = load_items_file(&items_path)?;
    let outcome = apply_patch(&validator, &values, &patch)?;

    for id in &outcome.missing_ids {
        eprintln!("WARNING: no item with id {id}");
    }

    let target = output.unwrap_or_else(|| items_path.clone());
    write_json(&target, &outcome.values)?;
    eprintln!(
        "Patched {} item(s), saved to: {}",
        outcome.report.items.len(),
        target.display()
    );

    print!("{}", outcome.report.render_text());
    println!("\n{}", summary_table(&outcome.report));

    Ok(if outcome.report.passed { 0 } else { 1 })
}
