//! Field paths, filters and in-place changes shared by every backend.

use serde::Serialize;
use serde_json::Value;

use crate::trait_::{Document, FieldChange, Result, StorageError};

/// Query predicate over a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document
    All,
    /// Field at path equals value
    Eq(String, Value),
    /// Array at path contains value
    Contains(String, Value),
    /// Every sub-filter matches
    And(Vec<Filter>),
}

impl Filter {
    /// Field at `path` equals `value`.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(path.into(), value.into())
    }

    /// Array at `path` contains `value`.
    pub fn contains(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Contains(path.into(), value.into())
    }

    /// Whether `doc` satisfies the filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, value) => get_path(doc, path) == Some(value),
            Filter::Contains(path, value) => get_path(doc, path)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Serialize a value that must encode as a JSON object.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Other(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

/// Read the value at a dotted path.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Apply changes in order. On error the document may be partially changed;
/// backends apply to a copy and only persist on success.
pub fn apply_changes(doc: &mut Document, changes: &[FieldChange]) -> Result<()> {
    for change in changes {
        match change {
            FieldChange::Set(path, value) => {
                let (parent, leaf) = parent_mut(doc, path, true)?;
                if let Some(parent) = parent {
                    parent.insert(leaf.to_string(), value.clone());
                }
            }
            FieldChange::Delete(path) => {
                let (parent, leaf) = parent_mut(doc, path, false)?;
                if let Some(parent) = parent {
                    parent.remove(leaf);
                }
            }
            FieldChange::Union(path, values) => {
                let (parent, leaf) = parent_mut(doc, path, true)?;
                let Some(parent) = parent else { continue };
                let slot = parent
                    .entry(leaf.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let items = slot
                    .as_array_mut()
                    .ok_or_else(|| StorageError::InvalidPath(format!("{} is not an array", path)))?;
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            FieldChange::Remove(path, values) => {
                let (parent, leaf) = parent_mut(doc, path, false)?;
                let Some(slot) = parent.and_then(|p| p.get_mut(leaf)) else { continue };
                let items = slot
                    .as_array_mut()
                    .ok_or_else(|| StorageError::InvalidPath(format!("{} is not an array", path)))?;
                items.retain(|item| !values.contains(item));
            }
        }
    }
    Ok(())
}

/// Walk to the object holding the last path segment.
///
/// With `create`, missing intermediate objects are inserted; without it a
/// missing intermediate yields `None` (nothing to change).
fn parent_mut<'a, 'p>(
    doc: &'a mut Document,
    path: &'p str,
    create: bool,
) -> Result<(Option<&'a mut Document>, &'p str)> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(StorageError::InvalidPath(path.to_string())),
    };

    let mut current = doc;
    for segment in parents {
        if !current.contains_key(*segment) {
            if !create {
                return Ok((None, leaf));
            }
            current.insert(segment.to_string(), Value::Object(Document::new()));
        }
        current = match current.get_mut(*segment) {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "{}: {} is not an object",
                    path, segment
                )))
            }
        };
    }
    Ok((Some(current), leaf))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_nested_path() {
        let mut d = doc(json!({ "enrollments": { "c1": "k1" } }));
        apply_changes(&mut d, &[FieldChange::set("enrollments.c2", "k2")]).unwrap();
        assert_eq!(Value::Object(d), json!({ "enrollments": { "c1": "k1", "c2": "k2" } }));
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut d = Document::new();
        apply_changes(&mut d, &[FieldChange::set("quizScores.q1", 80)]).unwrap();
        assert_eq!(get_path(&d, "quizScores.q1"), Some(&json!(80)));
    }

    #[test]
    fn test_set_through_scalar_is_rejected() {
        let mut d = doc(json!({ "name": "x" }));
        let err = apply_changes(&mut d, &[FieldChange::set("name.first", "y")]).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut d = doc(json!({ "a": 1 }));
        apply_changes(&mut d, &[FieldChange::delete("b.c"), FieldChange::delete("a")]).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn test_union_is_set_like() {
        let mut d = doc(json!({ "ids": ["u1"] }));
        apply_changes(
            &mut d,
            &[FieldChange::union("ids", "u1"), FieldChange::union("ids", "u2")],
        )
        .unwrap();
        assert_eq!(d["ids"], json!(["u1", "u2"]));

        apply_changes(&mut d, &[FieldChange::union("fresh", "x")]).unwrap();
        assert_eq!(d["fresh"], json!(["x"]));
    }

    #[test]
    fn test_remove_from_array() {
        let mut d = doc(json!({ "ids": ["u1", "u2"] }));
        apply_changes(&mut d, &[FieldChange::remove("ids", "u1")]).unwrap();
        assert_eq!(d["ids"], json!(["u2"]));

        apply_changes(&mut d, &[FieldChange::remove("missing", "u1")]).unwrap();
    }

    #[test]
    fn test_empty_segment_is_rejected() {
        let mut d = Document::new();
        assert!(apply_changes(&mut d, &[FieldChange::set("a..b", 1)]).is_err());
        assert!(apply_changes(&mut d, &[FieldChange::set("", 1)]).is_err());
    }

    #[test]
    fn test_filters() {
        let d = doc(json!({ "courseId": "c1", "studentIds": ["u1", "u2"], "meta": { "open": true } }));

        assert!(Filter::All.matches(&d));
        assert!(Filter::eq("courseId", "c1").matches(&d));
        assert!(!Filter::eq("courseId", "c2").matches(&d));
        assert!(Filter::contains("studentIds", "u2").matches(&d));
        assert!(!Filter::contains("courseId", "c1").matches(&d));
        assert!(Filter::eq("meta.open", true).matches(&d));
        assert!(Filter::And(vec![
            Filter::eq("courseId", "c1"),
            Filter::contains("studentIds", "u1"),
        ])
        .matches(&d));
    }

    #[test]
    fn test_to_document_requires_object() {
        assert!(to_document(&json!({ "a": 1 })).is_ok());
        assert!(to_document(&json!([1, 2])).is_err());
    }
}
