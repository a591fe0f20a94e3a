//! Metadata validation and normalization.
//!
//! [`validate`] turns a [`RawItem`] into an [`Item`] without touching the
//! filesystem. [`check_collisions`] enforces name and archive file name
//! uniqueness within a kind once the whole batch has been validated.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::archive::archive_file_stem;
use crate::error::ValidationError;
use crate::models::{Item, ItemKind, ItemMetadata};
use crate::scanner::RawItem;

/// Parse and check a raw item's metadata descriptor.
///
/// Required: `name` and `description` (non-empty strings). Tools must also
/// declare `parameters` (input schema) and `result` (output schema) as
/// objects.
pub fn validate(raw: RawItem) -> Result<Item, ValidationError> {
    let path = raw.dir.path.as_path();
    let value: Value =
        serde_json::from_str(&raw.metadata_text).map_err(|e| ValidationError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let obj = value.as_object().ok_or_else(|| ValidationError::WrongShape {
        path: path.to_path_buf(),
        field: "(root)".to_string(),
        expected: "a JSON object",
    })?;

    let name = required_string(obj, "name", path)?;
    let description = required_string(obj, "description", path)?;
    let version = optional_string(obj, "version", path)?;
    let author = optional_string(obj, "author", path)?;
    let keywords = optional_string_list(obj, "keywords", path)?;

    let (parameters, result) = if raw.dir.kind.requires_schema() {
        (
            Some(required_object(obj, "parameters", path)?),
            Some(required_object(obj, "result", path)?),
        )
    } else {
        (
            optional_object(obj, "parameters", path)?,
            optional_object(obj, "result", path)?,
        )
    };

    Ok(Item {
        name,
        kind: raw.dir.kind,
        source_path: raw.dir.path,
        entry_file: raw.dir.entry_file,
        metadata: ItemMetadata {
            description,
            version,
            author,
            keywords,
            parameters,
            result,
            raw: value,
        },
        entry_content: raw.entry_content,
    })
}

/// Split a validated batch into unique items and collision errors.
///
/// Every item whose `name` is shared with another item of the same kind is
/// rejected, so the outcome does not depend on enumeration order. Distinct
/// names that map to the same archive file name (`Echo Tool` and
/// `echo-tool`) are rejected the same way.
pub fn check_collisions(items: Vec<Item>) -> (Vec<Item>, Vec<ValidationError>) {
    let mut names: HashMap<(ItemKind, String), usize> = HashMap::new();
    let mut stems: HashMap<(ItemKind, String), usize> = HashMap::new();
    for item in &items {
        *names.entry((item.kind, item.name.clone())).or_default() += 1;
        *stems
            .entry((item.kind, archive_file_stem(&item.name)))
            .or_default() += 1;
    }
    let shared = |counts: &HashMap<(ItemKind, String), usize>, key: (ItemKind, String)| {
        counts.get(&key).copied().unwrap_or(0) > 1
    };

    let mut unique = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for item in items {
        let stem = archive_file_stem(&item.name);
        if shared(&names, (item.kind, item.name.clone())) {
            errors.push(ValidationError::NameCollision {
                path: item.source_path,
                kind: item.kind,
                name: item.name,
            });
        } else if shared(&stems, (item.kind, stem.clone())) {
            errors.push(ValidationError::FileNameCollision {
                path: item.source_path,
                kind: item.kind,
                name: item.name,
                stem,
            });
        } else {
            unique.push(item);
        }
    }
    (unique, errors)
}

fn required_string(
    obj: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<String, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(missing(field, path)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(wrong_shape(field, "a non-empty string", path)),
    }
}

fn optional_string(
    obj: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<Option<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_shape(field, "a string", path)),
    }
}

fn optional_string_list(
    obj: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<Vec<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| wrong_shape(field, "an array of strings", path))
            })
            .collect(),
        Some(_) => Err(wrong_shape(field, "an array of strings", path)),
    }
}

fn required_object(
    obj: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<Value, ValidationError> {
    optional_object(obj, field, path)?.ok_or_else(|| missing(field, path))
}

fn optional_object(
    obj: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<Option<Value>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Object(_)) => Ok(Some(v.clone())),
        Some(_) => Err(wrong_shape(field, "an object", path)),
    }
}

fn missing(field: &str, path: &Path) -> ValidationError {
    ValidationError::MissingField {
        path: path.to_path_buf(),
        field: field.to_string(),
    }
}

fn wrong_shape(field: &str, expected: &'static str, path: &Path) -> ValidationError {
    ValidationError::WrongShape {
        path: path.to_path_buf(),
        field: field.to_string(),
        expected,
    }
}
