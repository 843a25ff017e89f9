//! The `ortforge plan` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use ortforge_core::config::load_config_from;
use ortforge_core::planner::plan_batch;

pub fn execute(count: usize, config_path: Option<PathBuf>) -> Result<i32> {
    let config = load_config_from(config_path.as_deref())?;
    let plan = plan_batch(
        count,
        &config.planner.category_ratios,
        &config.planner.difficulty_ratios,
    )?;

    let levels: Vec<u8> = {
        let mut levels: Vec<u8> = plan
            .difficulties
            .values()
            .flat_map(|d| d.keys().copied())
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    };

    let mut table = Table::new();
    let mut header = vec!["Category".to_string()];
    header.extend(levels.iter().map(|l| format!("D{l}")));
    header.push("Total".to_string());
    table.set_header(header);

    for (category, total) in &plan.categories {
        let mut row = vec![Cell::new(category)];
        let spread = plan.difficulties.get(category);
        for level in &levels {
            let n = spread.and_then(|d| d.get(level)).copied().unwrap_or(0);
            row.push(Cell::new(n));
        }
        row.push(Cell::new(total));
        table.add_row(row);
    }

    println!("{table}");
    println!("{} slots planned", plan.slots.len());
    Ok(0)
}
