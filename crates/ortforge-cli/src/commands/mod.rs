pub mod compare;
pub mod fix;
pub mod generate;
pub mod init;
pub mod plan;
pub mod validate;

use std::time::Duration;

use comfy_table::{Cell, Table};

use ortforge_core::engine::ProgressReporter;
use ortforge_core::report::{ItemReport, ValidationReport};

/// Console progress reporter. Per-item lines only appear at debug level.
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_item_complete(&self, report: &ItemReport) {
        tracing::debug!(
            item = %report.item_id,
            status = %report.status,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "item done"
        );
    }

    fn on_batch_complete(&self, total: usize, errors: usize, elapsed: Duration) {
        eprintln!(
            "Complete: {total} items, {errors} errors ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

/// Status counts and the layout histogram as a table.
pub fn summary_table(report: &ValidationReport) -> Table {
    let s = &report.summary;
    let mut table = Table::new();
    table.set_header(vec![
        "Items", "Passed", "Flagged", "Rejected", "Schema errors", "Errors", "Warnings",
    ]);
    table.add_row(vec![
        Cell::new(s.total),
        Cell::new(s.passed),
        Cell::new(s.flagged),
        Cell::new(s.rejected),
        Cell::new(s.schema_errors),
        Cell::new(s.errors),
        Cell::new(s.warnings),
    ]);
    table
}
