//! The `ortforge generate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use ortforge_core::config::load_config_from;
use ortforge_core::engine::BatchEngine;
use ortforge_core::items::write_json;
use ortforge_core::statistics::{compute_batch_statistics, plan_drift};
use ortforge_core::template::{lint_library, load_libraries, TemplateRegistry};
use ortforge_report::{write_html_report, write_sarif_report};

use super::{summary_table, ConsoleReporter};

pub fn execute(
    templates_path: PathBuf,
    count: usize,
    seed: Option<u64>,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<i32> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    let formats: Vec<&str> = if format == "all" {
        vec!["json", "html", "sarif"]
    } else {
        format.split(',').map(str::trim).collect()
    };
    for fmt in &formats {
        anyhow::ensure!(
            matches!(*fmt, "json" | "html" | "sarif"),
            "unknown format: {fmt} (expected json, html, sarif or all)"
        );
    }

    let libraries = load_libraries(&templates_path)?;
    for library in &libraries {
        for w in lint_library(library) {
            let id = w.template_id.as_deref().unwrap_or("-");
            eprintln!("  [{}/{id}] WARNING: {}", library.id, w.message);
        }
    }
    let registry = TemplateRegistry::from_libraries(libraries);
    anyhow::ensure!(
        !registry.is_empty(),
        "no templates found in {}",
        templates_path.display()
    );
    eprintln!(
        "ortforge v{}: generating {count} items from {} templates (seed {})",
        env!("CARGO_PKG_VERSION"),
        registry.len(),
        config.seed
    );

    let engine = BatchEngine::new(config)?.with_registry(registry);
    let batch = engine.generate_batch(count, Some(chrono::Utc::now()), &ConsoleReporter)?;

    let stats = compute_batch_statistics(&batch.accepted, engine.validator().distractor_model());
    let drift = plan_drift(&batch.plan.categories, &stats.categories);

    let mut table = Table::new();
    table.set_header(vec!["Category", "Planned", "Accepted", "Drift"]);
    for (category, delta) in &drift {
        table.add_row(vec![
            Cell::new(category),
            Cell::new(batch.plan.categories.get(category).copied().unwrap_or(0)),
            Cell::new(stats.categories.get(category).copied().unwrap_or(0)),
            Cell::new(format!("{delta:+}")),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!("{}", summary_table(&batch.report));
    if let Some(avg) = stats.average_plausibility {
        eprintln!("Average distractor plausibility: {avg:.2}");
    }
    for id in &batch.rejected {
        eprintln!("  rejected: {id}");
    }

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let items_path = output.join(format!("items-{timestamp}.json"));
    write_json(&items_path, &batch.accepted)?;
    eprintln!("Items saved to: {}", items_path.display());

    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("report-{timestamp}.json"));
                batch.report.save_json(&path)?;
                eprintln!("Report saved to: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&batch.report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            "sarif" => {
                let path = output.join(format!("report-{timestamp}.sarif"));
                write_sarif_report(&batch.report, &path)?;
                eprintln!("SARIF report: {}", path.display());
            }
            _ => {}
        }
    }

    Ok(0)
}
