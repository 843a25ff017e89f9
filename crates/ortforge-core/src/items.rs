//! Reading and writing item batches.
//!
//! A batch file is either a JSON array of items or an object with an `items`
//! array. Items stay raw [`Value`]s until validation so that one malformed
//! record cannot prevent the rest of the file from loading. Directory scans
//! skip validation reports, which share the `items` key.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Split a batch document into raw item values.
pub fn parse_items_str(content: &str, source_path: &Path) -> Result<Vec<Value>> {
    split_batch(parse_document(content, source_path)?, source_path)
}

fn parse_document(content: &str, source_path: &Path) -> Result<Value> {
    serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON: {}", source_path.display()))
}

fn split_batch(doc: Value, source_path: &Path) -> Result<Vec<Value>> {
    match doc {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => anyhow::bail!(
                "{}: expected an array of items or an object with an `items` array",
                source_path.display()
            ),
        },
        _ => anyhow::bail!(
            "{}: expected an array of items or an object with an `items` array",
            source_path.display()
        ),
    }
}

/// A serialized validation report rather than an item batch.
fn is_report_document(doc: &Value) -> bool {
    doc.get("summary").is_some_and(Value::is_object) && doc.get("created_at").is_some()
}

fn read_items_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read items file: {}", path.display()))
}

/// Load items from a batch file.
pub fn load_items_file(path: &Path) -> Result<Vec<Value>> {
    parse_items_str(&read_items_file(path)?, path)
}

/// Load items from a file, or from every `.json` file under a directory
/// (recursively, in path order).
pub fn load_items(path: &Path) -> Result<Vec<Value>> {
    if !path.is_dir() {
        return load_items_file(path);
    }

    let mut entries = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    let mut items = Vec::new();
    for entry in entries {
        if entry.is_dir() {
            items.extend(load_items(&entry)?);
        } else if entry.extension().is_some_and(|ext| ext == "json") {
            let doc = parse_document(&read_items_file(&entry)?, &entry)?;
            if is_report_document(&doc) {
                tracing::debug!("skipping report {}", entry.display());
                continue;
            }
            let loaded = split_batch(doc, &entry)?;
            tracing::debug!(count = loaded.len(), "loaded {}", entry.display());
            items.extend(loaded);
        }
    }
    Ok(items)
}

/// Write any serializable batch as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize items")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn array_and_wrapped_forms() {
        let src = PathBuf::from("batch.json");
        let items = parse_items_str(r#"[{"id": 1}, {"id": 2}]"#, &src).unwrap();
        assert_eq!(items.len(), 2);
        let items = parse_items_str(r#"{"items": [{"id": "a"}]}"#, &src).unwrap();
        assert_eq!(items[0]["id"], "a");
        assert!(parse_items_str(r#"{"questions": []}"#, &src).is_err());
        assert!(parse_items_str("42", &src).is_err());
    }

    #[test]
    fn directory_is_scanned_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write_json(&dir.path().join("a.json"), &json!([{ "id": 1 }])).unwrap();
        write_json(&dir.path().join("sub").join("b.json"), &json!({ "items": [{ "id": 2 }, { "id": 3 }] }))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let items = load_items(dir.path()).unwrap();
        let ids: Vec<i64> = items.iter().filter_map(|v| v["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn directory_scan_skips_reports() {
        use crate::report::ValidationReport;

        let dir = tempfile::tempdir().unwrap();
        write_json(&dir.path().join("items.json"), &json!([{ "id": 1 }, { "id": 2 }])).unwrap();
        let report = ValidationReport::new("generated", Vec::new());
        report.save_json(&dir.path().join("report.json")).unwrap();

        let items = load_items(dir.path()).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn missing_file_has_context() {
        let err = load_items(Path::new("/nonexistent/items.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read items file"));
    }
}
