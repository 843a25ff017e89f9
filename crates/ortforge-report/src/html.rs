//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use ortforge_core::report::{ItemStatus, ValidationReport};
use ortforge_core::Severity;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn status_class(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Passed => "pass",
        ItemStatus::Flagged => "flag",
        ItemStatus::Rejected | ItemStatus::SchemaError => "fail",
    }
}

/// Generate an HTML report from a validation report.
pub fn generate_html(report: &ValidationReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>ortforge report: {}</title>\n",
        html_escape(&report.source)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    let verdict = if report.passed { "PASS" } else { "FAIL" };
    html.push_str("<header>\n");
    html.push_str("<h1>ortforge validation report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Source: <strong>{}</strong> | {} items | {} | <span class=\"{}\">{}</span></p>\n",
        html_escape(&report.source),
        report.summary.total,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        if report.passed { "pass" } else { "fail" },
        verdict,
    ));
    html.push_str("</header>\n");

    // Summary
    let s = &report.summary;
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Passed</th><th>Flagged</th><th>Rejected</th><th>Schema errors</th><th>Errors</th><th>Warnings</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr></tbody>\n",
        s.passed, s.flagged, s.rejected, s.schema_errors, s.errors, s.warnings
    ));
    html.push_str("</table>\n");

    if !report.layout_histogram.is_empty() {
        html.push_str("<h3>Layouts</h3>\n");
        html.push_str(&generate_bar_chart(&report.layout_histogram));
    }
    html.push_str("</section>\n");

    // Per-item results
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Items</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">#</th><th onclick=\"sortTable(1)\">Item</th><th onclick=\"sortTable(2)\">Layout</th><th onclick=\"sortTable(3)\">Status</th><th>Diagnostics</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for item in &report.items {
        let class = status_class(item.status);
        let diagnostics = if item.diagnostics.is_empty() {
            "-".to_string()
        } else {
            let entries: Vec<String> = item
                .diagnostics
                .iter()
                .map(|d| {
                    let sev = match d.severity {
                        Severity::Error => "error",
                        Severity::Warning => "warning",
                    };
                    format!(
                        "<li class=\"{sev}\">[{}] {}</li>",
                        d.category,
                        html_escape(&d.message)
                    )
                })
                .collect();
            format!("<ul>{}</ul>", entries.join(""))
        };

        html.push_str(&format!(
            "<tr class=\"{class}\"><td>{}</td><td>{}</td><td>{}</td><td class=\"{class}\">{}</td><td>{}</td></tr>\n",
            item.index + 1,
            html_escape(&item.item_id),
            item.layout.as_deref().unwrap_or("-"),
            item.status,
            diagnostics,
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &ValidationReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

/// Horizontal SVG bars, one per layout, scaled to the most common layout.
fn generate_bar_chart(histogram: &BTreeMap<String, usize>) -> String {
    let bar_height = 26;
    let max_width = 400;
    let padding = 8;
    let label_width = 180;

    let peak = histogram.values().copied().max().unwrap_or(0).max(1);
    let total_height = histogram.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, (layout, count)) in histogram.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = count * max_width / peak;

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(layout)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{label_width}\" y=\"{y}\" width=\"{width}\" height=\"{bar_height}\" fill=\"#3b82f6\" rx=\"4\"/>\n"
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{count}</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --flag: #fef9c3; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --flag: #713f12; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; vertical-align: top; }
th { background: var(--border); cursor: pointer; }
ul { margin: 0; padding-left: 1.2rem; }
li.error { color: #b91c1c; }
li.warning { color: #a16207; }
.pass { background: var(--pass); }
.flag { background: var(--flag); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = Number(va), nb = Number(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
