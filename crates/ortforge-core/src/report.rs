//! Batch validation reports with JSON persistence and regression detection.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GenerateError, SchemaError};
use crate::solver::SolverStatus;
use crate::validator::{Category, Diagnostic, Severity, ValidationResult};

/// Outcome of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// No diagnostics.
    Passed,
    /// Warnings only; the item may ship.
    Flagged,
    /// At least one error.
    Rejected,
    /// The item could not be decoded or its logic engine is malformed.
    SchemaError,
}

impl ItemStatus {
    pub fn has_errors(&self) -> bool {
        matches!(self, ItemStatus::Rejected | ItemStatus::SchemaError)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Passed => write!(f, "passed"),
            ItemStatus::Flagged => write!(f, "flagged"),
            ItemStatus::Rejected => write!(f, "rejected"),
            ItemStatus::SchemaError => write!(f, "schema error"),
        }
    }
}

/// Diagnostics for one item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub item_id: String,
    /// Position in the input batch.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    pub status: ItemStatus,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverStatus>,
}

impl ItemReport {
    pub fn from_result(
        item_id: impl Into<String>,
        index: usize,
        layout: Option<&str>,
        result: &ValidationResult,
    ) -> Self {
        let status = if !result.errors.is_empty() {
            ItemStatus::Rejected
        } else if !result.warnings.is_empty() {
            ItemStatus::Flagged
        } else {
            ItemStatus::Passed
        };
        Self {
            item_id: item_id.into(),
            index,
            layout: layout.map(str::to_string),
            status,
            diagnostics: result.diagnostics().cloned().collect(),
            solver: result.solver.as_ref().map(|s| s.status),
        }
    }

    pub fn schema_error(item_id: impl Into<String>, index: usize, error: &SchemaError) -> Self {
        Self::unprocessable(item_id.into(), index, error.to_string())
    }

    /// A slot whose template could not be filled in.
    pub fn generation_error(item_id: impl Into<String>, index: usize, error: &GenerateError) -> Self {
        Self::unprocessable(item_id.into(), index, error.to_string())
    }

    fn unprocessable(item_id: String, index: usize, message: String) -> Self {
        Self {
            item_id,
            index,
            layout: None,
            status: ItemStatus::SchemaError,
            diagnostics: vec![Diagnostic::error(Category::Schema, message)],
            solver: None,
        }
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Item and diagnostic counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub flagged: usize,
    pub rejected: usize,
    pub schema_errors: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// A complete batch validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Unique report identifier.
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// What was validated (a path or a generation label).
    pub source: String,
    pub items: Vec<ItemReport>,
    /// Layout name → number of decodable items using it.
    pub layout_histogram: BTreeMap<String, usize>,
    pub summary: ReportSummary,
    /// True iff no item carries an error. Warnings never fail a batch.
    pub passed: bool,
}

impl ValidationReport {
    pub fn new(source: impl Into<String>, items: Vec<ItemReport>) -> Self {
        let mut layout_histogram = BTreeMap::new();
        let mut summary = ReportSummary {
            total: items.len(),
            ..Default::default()
        };
        for item in &items {
            if let Some(layout) = &item.layout {
                *layout_histogram.entry(layout.clone()).or_insert(0) += 1;
            }
            match item.status {
                ItemStatus::Passed => summary.passed += 1,
                ItemStatus::Flagged => summary.flagged += 1,
                ItemStatus::Rejected => summary.rejected += 1,
                ItemStatus::SchemaError => summary.schema_errors += 1,
            }
            summary.errors += item.error_count();
            summary.warnings += item.warning_count();
        }
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source: source.into(),
            passed: summary.errors == 0,
            items,
            layout_histogram,
            summary,
        }
    }

    pub fn item(&self, item_id: &str) -> Option<&ItemReport> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ValidationReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Every diagnostic grouped by item id, then the layout histogram and a summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            let _ = writeln!(out, "{}: {}", item.item_id, item.status);
            for d in &item.diagnostics {
                let _ = writeln!(out, "  {d}");
            }
        }
        if !self.layout_histogram.is_empty() {
            let layouts: Vec<String> = self
                .layout_histogram
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            let _ = writeln!(out, "\nLayouts: {}", layouts.join(", "));
        }
        let s = &self.summary;
        let _ = writeln!(
            out,
            "Summary: {} items, {} passed, {} flagged, {} rejected, {} schema errors ({} errors, {} warnings)",
            s.total, s.passed, s.flagged, s.rejected, s.schema_errors, s.errors, s.warnings
        );
        let _ = writeln!(out, "Result: {}", if self.passed { "PASS" } else { "FAIL" });
        out
    }

    /// Compare this report against a baseline.
    pub fn compare(&self, baseline: &ValidationReport) -> ComparisonReport {
        let by_id = |report: &ValidationReport| -> BTreeMap<String, ItemStatus> {
            report
                .items
                .iter()
                .map(|i| (i.item_id.clone(), i.status))
                .collect()
        };
        let before = by_id(baseline);
        let after = by_id(self);

        let mut comparison = ComparisonReport::default();
        for (id, &current) in &after {
            let Some(&previous) = before.get(id) else {
                comparison.new_items.push(id.clone());
                continue;
            };
            let change = StatusChange {
                item_id: id.clone(),
                baseline: previous,
                current,
            };
            match (previous.has_errors(), current.has_errors()) {
                (false, true) => comparison.regressions.push(change),
                (true, false) => comparison.fixes.push(change),
                _ => comparison.unchanged += 1,
            }
        }
        comparison.removed_items = before
            .keys()
            .filter(|id| !after.contains_key(*id))
            .cloned()
            .collect();
        comparison
    }
}

/// Result of comparing two validation reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Items that were error-free in the baseline and now carry errors.
    pub regressions: Vec<StatusChange>,
    /// Items that carried errors in the baseline and are now error-free.
    pub fixes: Vec<StatusChange>,
    pub unchanged: usize,
    pub new_items: Vec<String>,
    pub removed_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub item_id: String,
    pub baseline: ItemStatus,
    pub current: ItemStatus,
}

impl ComparisonReport {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} regressions, {} fixes, {} unchanged, {} new, {} removed\n\n",
            self.regressions.len(),
            self.fixes.len(),
            self.unchanged,
            self.new_items.len(),
            self.removed_items.len()
        ));

        for (title, changes) in [("Regressions", &self.regressions), ("Fixes", &self.fixes)] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Item | Baseline | Current |\n");
            md.push_str("|------|----------|---------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    c.item_id, c.baseline, c.current
                ));
            }
            md.push('\n');
        }

        md
    }

    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> ValidationResult {
        ValidationResult::default()
    }

    fn with_error(message: &str) -> ValidationResult {
        let mut r = ValidationResult::default();
        r.push(Diagnostic::error(Category::Structure, message));
        r
    }

    fn with_warning(message: &str) -> ValidationResult {
        let mut r = ValidationResult::default();
        r.push(Diagnostic::warning(Category::Bilingual, message));
        r
    }

    fn make_report(entries: &[(&str, ValidationResult)]) -> ValidationReport {
        let items = entries
            .iter()
            .enumerate()
            .map(|(i, (id, r))| ItemReport::from_result(*id, i, Some("standard"), r))
            .collect();
        ValidationReport::new("test", items)
    }

    #[test]
    fn warnings_never_fail_a_batch() {
        let report = make_report(&[("a", clean()), ("b", with_warning("parity"))]);
        assert!(report.passed);
        assert_eq!(report.summary.flagged, 1);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.layout_histogram["standard"], 2);
    }

    #[test]
    fn schema_errors_fail_the_batch() {
        let mut items = vec![ItemReport::from_result("a", 0, Some("chart"), &clean())];
        items.push(ItemReport::schema_error(
            "#2",
            1,
            &SchemaError::Malformed("invalid type: string, expected a sequence".into()),
        ));
        let report = ValidationReport::new("test", items);
        assert!(!report.passed);
        assert_eq!(report.summary.schema_errors, 1);
        assert_eq!(report.layout_histogram.len(), 1);
        assert_eq!(report.item("#2").unwrap().diagnostics[0].category, Category::Schema);
    }

    #[test]
    fn text_groups_diagnostics_by_item() {
        let report = make_report(&[
            ("q-1", with_error("item has no choices")),
            ("q-2", with_warning("text locale lengths differ")),
        ]);
        let text = report.render_text();
        assert!(text.contains("q-1: rejected\n  error [structure] item has no choices"));
        assert!(text.contains("q-2: flagged\n  warning [bilingual] text locale lengths differ"));
        assert!(text.contains("Summary: 2 items, 0 passed, 1 flagged, 1 rejected"));
        assert!(text.ends_with("Result: FAIL\n"));
    }

    #[test]
    fn compare_detects_regressions_and_fixes() {
        let baseline = make_report(&[
            ("a", clean()),
            ("b", with_error("broken")),
            ("c", with_warning("meh")),
            ("gone", clean()),
        ]);
        let current = make_report(&[
            ("a", with_error("broken now")),
            ("b", clean()),
            ("c", clean()),
            ("fresh", clean()),
        ]);
        let cmp = current.compare(&baseline);
        assert!(cmp.has_regressions());
        assert_eq!(cmp.regressions[0].item_id, "a");
        assert_eq!(cmp.fixes[0].item_id, "b");
        assert_eq!(cmp.unchanged, 1);
        assert_eq!(cmp.new_items, vec!["fresh"]);
        assert_eq!(cmp.removed_items, vec!["gone"]);

        let md = cmp.to_markdown();
        assert!(md.contains("1 regressions, 1 fixes"));
        assert!(md.contains("| a | passed | rejected |"));
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report(&[("a", with_warning("parity"))]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        report.save_json(&path).unwrap();
        let loaded = ValidationReport::load_json(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.items, report.items);
        assert_eq!(loaded.summary, report.summary);
    }
}
