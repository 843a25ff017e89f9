//! SARIF (Static Analysis Results Interchange Format) output.
//!
//! Generates SARIF 2.1.0 documents so item diagnostics can be browsed in
//! code-scanning dashboards. Each diagnostic becomes one result; the rule id
//! is the diagnostic category.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use ortforge_core::report::ValidationReport;
use ortforge_core::validator::Category;
use ortforge_core::Severity;

const RULES: [(Category, &str, &str); 7] = [
    (Category::Structure, "Item Structure", "Required fields, choice count, or the answer key are wrong"),
    (Category::Bilingual, "Bilingual Parity", "A translation is missing or the locales drift apart in length"),
    (Category::Classification, "Classification", "Section, subsection, or difficulty is missing or out of range"),
    (Category::Layout, "Layout Payload", "The rendering payload does not match the declared layout"),
    (Category::Distractor, "Distractor Coverage", "An incorrect choice lacks a usable cognitive-trap rationale"),
    (Category::Solver, "Constraint Solver", "The declared comparison relation does not hold over the variable domain"),
    (Category::Schema, "Schema Error", "The item could not be decoded or its logic engine is malformed"),
];

fn rule_id(category: Category) -> String {
    format!("ort-{category}")
}

/// Generate a SARIF 2.1.0 JSON document from a validation report.
pub fn generate_sarif(report: &ValidationReport) -> serde_json::Value {
    let rules: Vec<serde_json::Value> = RULES
        .iter()
        .map(|(category, name, desc)| {
            json!({
                "id": rule_id(*category),
                "name": name,
                "shortDescription": { "text": desc },
            })
        })
        .collect();

    let mut results = Vec::new();
    for item in &report.items {
        let location = json!({
            "physicalLocation": {
                "artifactLocation": { "uri": report.source }
            },
            "logicalLocations": [{
                "name": item.item_id,
                "kind": "object",
                "index": item.index,
            }]
        });

        for d in &item.diagnostics {
            let level = match d.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            results.push(json!({
                "ruleId": rule_id(d.category),
                "level": level,
                "message": { "text": format!("{}: {}", item.item_id, d.message) },
                "locations": [location.clone()]
            }));
        }
    }

    json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "ortforge",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/MysterionRise/ortforge",
                    "rules": rules
                }
            },
            "invocations": [{
                "executionSuccessful": true,
                "endTimeUtc": report
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            }],
            "results": results
        }]
    })
}

/// Write a SARIF report to a file.
pub fn write_sarif_report(report: &ValidationReport, path: &Path) -> Result<()> {
    let sarif = generate_sarif(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&sarif)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write SARIF report to {}", path.display()))?;
    Ok(())
}
