//! The `ortforge compare` command.

use std::path::PathBuf;

use anyhow::Result;

use ortforge_core::report::ValidationReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    fail_on_regression: bool,
    format: String,
) -> Result<i32> {
    let baseline = ValidationReport::load_json(&baseline_path)?;
    let current = ValidationReport::load_json(&current_path)?;

    let report = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!(
                "Comparison: {} regressions, {} fixes, {} unchanged",
                report.regressions.len(),
                report.fixes.len(),
                report.unchanged
            );

            if !report.regressions.is_empty() {
                println!("\nRegressions:");
                for r in &report.regressions {
                    println!("  {} {} -> {}", r.item_id, r.baseline, r.current);
                }
            }

            if !report.fixes.is_empty() {
                println!("\nFixes:");
                for f in &report.fixes {
                    println!("  {} {} -> {}", f.item_id, f.baseline, f.current);
                }
            }

            if !report.new_items.is_empty() {
                println!("\n{} new item(s)", report.new_items.len());
            }
            if !report.removed_items.is_empty() {
                println!("{} removed item(s)", report.removed_items.len());
            }
        }
    }

    Ok(if fail_on_regression && report.has_regressions() {
        1
    } else {
        0
    })
}
