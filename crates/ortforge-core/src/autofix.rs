//! Auto-fix: apply a field patch to selected items, then re-validate them.
//!
//! Patches address fields by JSON pointer (RFC 6901). Missing intermediate
//! objects are created. Only the patched items are re-validated, and the
//! returned report covers exactly those items.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::validate_value;
use crate::error::PatchError;
use crate::model::item_label;
use crate::report::ValidationReport;
use crate::validator::Validator;

/// Set the value at `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub path: String,
    pub value: Value,
}

impl PatchOp {
    /// Parse `/pointer=value`. The value is read as JSON, falling back to a
    /// plain string.
    pub fn parse(assignment: &str) -> Result<Self, PatchError> {
        let (path, raw) = assignment
            .split_once('=')
            .ok_or_else(|| PatchError::BadAssignment(assignment.to_string()))?;
        if !path.starts_with('/') {
            return Err(PatchError::InvalidPointer(path.to_string()));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Ok(Self {
            path: path.to_string(),
            value,
        })
    }
}

/// Operations applied to every item whose id is listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub ids: Vec<String>,
    pub ops: Vec<PatchOp>,
}

#[derive(Debug, Clone)]
pub struct FixOutcome {
    /// The full batch with patches applied.
    pub values: Vec<Value>,
    /// Validation of the patched items only.
    pub report: ValidationReport,
    /// Requested ids that matched no item.
    pub missing_ids: Vec<String>,
}

/// Apply `patch` to matching items and re-validate just those items.
pub fn apply_patch(
    validator: &Validator,
    values: &[Value],
    patch: &Patch,
) -> Result<FixOutcome, PatchError> {
    if patch.ops.iter().any(|op| op.path == "/id") {
        return Err(PatchError::ImmutableId);
    }
    let wanted: BTreeSet<&str> = patch.ids.iter().map(String::as_str).collect();
    let mut found = BTreeSet::new();
    let mut patched = Vec::new();
    let mut values = values.to_vec();

    for (index, value) in values.iter_mut().enumerate() {
        let label = item_label(value, index);
        if !wanted.contains(label.as_str()) {
            continue;
        }
        for op in &patch.ops {
            set_pointer(value, &op.path, op.value.clone())?;
        }
        tracing::debug!(item = %label, ops = patch.ops.len(), "patched item");
        found.insert(label);
        patched.push(index);
    }

    let items = patched
        .iter()
        .map(|&i| validate_value(validator, i, &values[i]))
        .collect();
    let missing_ids = patch
        .ids
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect();

    Ok(FixOutcome {
        report: ValidationReport::new("auto-fix", items),
        values,
        missing_ids,
    })
}

/// Write `value` at a JSON pointer, creating intermediate objects. Array
/// tokens must index an existing element, or be `-` (append) at the end.
pub fn set_pointer(target: &mut Value, pointer: &str, value: Value) -> Result<(), PatchError> {
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    };
    let tokens: Vec<String> = rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    let (last, parents) = tokens
        .split_last()
        .ok_or_else(|| PatchError::InvalidPointer(pointer.to_string()))?;

    let mut current = target;
    for token in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let len = items.len();
                let i = array_index(token, len, pointer)?;
                items.get_mut(i).ok_or_else(|| PatchError::BadIndex {
                    pointer: pointer.to_string(),
                    token: token.clone(),
                })?
            }
            _ => {
                return Err(PatchError::NotAContainer {
                    pointer: pointer.to_string(),
                })
            }
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            if last == "-" || last.parse::<usize>().ok() == Some(items.len()) {
                items.push(value);
            } else {
                let i = array_index(last, items.len(), pointer)?;
                items[i] = value;
            }
        }
        _ => {
            return Err(PatchError::NotAContainer {
                pointer: pointer.to_string(),
            })
        }
    }
    Ok(())
}

fn array_index(token: &str, len: usize, pointer: &str) -> Result<usize, PatchError> {
    match token.parse::<usize>() {
        Ok(i) if i < len => Ok(i),
        _ => Err(PatchError::BadIndex {
            pointer: pointer.to_string(),
            token: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ItemStatus;
    use serde_json::json;

    #[test]
    fn pointer_creates_intermediate_objects() {
        let mut v = json!({ "id": 1 });
        set_pointer(&mut v, "/rendering/diagram/svg", json!("<svg/>")).unwrap();
        assert_eq!(v["rendering"]["diagram"]["svg"], "<svg/>");
    }

    #[test]
    fn pointer_into_arrays() {
        let mut v = json!({ "choices": [{ "letter": "A" }, { "letter": "B" }] });
        set_pointer(&mut v, "/choices/1/isCorrect", json!(true)).unwrap();
        assert_eq!(v["choices"][1]["isCorrect"], true);
        set_pointer(&mut v, "/choices/-", json!({ "letter": "C" })).unwrap();
        assert_eq!(v["choices"].as_array().unwrap().len(), 3);
        assert!(matches!(
            set_pointer(&mut v, "/choices/9/letter", json!("Z")),
            Err(PatchError::BadIndex { .. })
        ));
        assert!(matches!(
            set_pointer(&mut v, "/choices/0/letter/x", json!(1)),
            Err(PatchError::NotAContainer { .. })
        ));
    }

    #[test]
    fn pointer_escapes() {
        let mut v = json!({});
        set_pointer(&mut v, "/distractorRationale/a~1b~0c", json!({})).unwrap();
        assert!(v["distractorRationale"].get("a/b~c").is_some());
        assert!(matches!(
            set_pointer(&mut v, "text", json!(1)),
            Err(PatchError::InvalidPointer(_))
        ));
    }

    #[test]
    fn parse_assignment() {
        let op = PatchOp::parse("/classification/difficulty=3").unwrap();
        assert_eq!(op.value, json!(3));
        let op = PatchOp::parse("/text/ky=Салыштыргыла").unwrap();
        assert_eq!(op.value, json!("Салыштыргыла"));
        let op = PatchOp::parse(r#"/rendering/columns/B={"text":"√x"}"#).unwrap();
        assert_eq!(op.value["text"], "√x");
        assert!(PatchOp::parse("no-equals").is_err());
    }

    #[test]
    fn only_targeted_items_are_patched_and_revalidated() {
        let values = vec![
            json!({ "id": "a", "rendering": { "layout": "geometry" } }),
            json!({ "id": "b", "rendering": { "layout": "geometry" } }),
        ];
        let patch = Patch {
            ids: vec!["b".into(), "zzz".into()],
            ops: vec![PatchOp {
                path: "/rendering/diagram/image".into(),
                value: json!("triangle.png"),
            }],
        };
        let outcome = apply_patch(&Validator::default(), &values, &patch).unwrap();
        assert_eq!(outcome.values[0], values[0]);
        assert_eq!(outcome.values[1]["rendering"]["diagram"]["image"], "triangle.png");
        assert_eq!(outcome.missing_ids, vec!["zzz"]);
        assert_eq!(outcome.report.items.len(), 1);
        let b = &outcome.report.items[0];
        assert_eq!(b.item_id, "b");
        assert_eq!(b.status, ItemStatus::Rejected);
        assert!(!b.diagnostics.iter().any(|d| d.message.contains("diagram")));
    }

    #[test]
    fn ids_cannot_be_patched() {
        let patch = Patch {
            ids: vec!["a".into()],
            ops: vec![PatchOp {
                path: "/id".into(),
                value: json!("b"),
            }],
        };
        assert_eq!(
            apply_patch(&Validator::default(), &[json!({ "id": "a" })], &patch).unwrap_err(),
            PatchError::ImmutableId
        );
    }
}
