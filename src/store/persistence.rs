//! Multi-file object persistence
//!
//! Each object lives in `{collection}/{id}/`. `meta.json` holds the scalar
//! top-level fields and every structured field has its own sibling file. Files
//! are pretty-printed JSON with sorted keys and a trailing newline, so equal
//! content always produces equal bytes.

use crate::error::StorageError;
use crate::store::{Document, FieldFile, META_FILE};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Outcome of one file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Merged content equals what is on disk; the file was left untouched.
    Unchanged,
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub(crate) async fn read_json(path: &Path) -> Result<Option<Value>, StorageError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::fs(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::MalformedField {
            path: path.to_path_buf(),
            field: file_label(path),
            reason: e.to_string(),
        })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn encode(value: &Value) -> Result<Vec<u8>, StorageError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Shallow merge: keys of `update` replace keys of `existing`, other keys survive.
/// Non-object values replace the existing content outright.
pub(crate) fn shallow_merge(existing: Option<Value>, update: Value) -> Value {
    match (existing, update) {
        (Some(Value::Object(mut base)), Value::Object(update)) => {
            for (key, value) in update {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, update) => update,
    }
}

/// Merge `update` into the file at `path` and rewrite it in full.
pub(crate) async fn merge_write(path: &Path, update: Value) -> Result<WriteOutcome, StorageError> {
    let current = match fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(StorageError::fs(path, e)),
    };

    let existing = match current.as_deref().map(serde_json::from_slice::<Value>) {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Existing file is not valid JSON; replacing it");
            None
        }
        None => None,
    };

    let merged = shallow_merge(existing, update);
    let bytes = encode(&merged)?;
    if current.as_deref() == Some(bytes.as_slice()) {
        return Ok(WriteOutcome::Unchanged);
    }

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| StorageError::fs(&temp_path, e))?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StorageError::fs(path, e));
    }
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote field file");
    Ok(WriteOutcome::Written)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load one object directory into a typed document.
///
/// A missing or unreadable meta file yields `MissingPrimaryFile`; a structured
/// field file that does not parse yields `MalformedField`. Either way only this
/// object is affected.
pub(crate) async fn load_object<T: Document>(dir: &Path, id: &T::Id) -> Result<T, StorageError> {
    let meta_path = dir.join(META_FILE);
    let mut raw = match read_json(&meta_path).await {
        Ok(Some(Value::Object(map))) => map,
        Ok(Some(_)) => {
            return Err(StorageError::MalformedField {
                path: meta_path,
                field: "meta".to_string(),
                reason: "primary file is not a JSON object".to_string(),
            })
        }
        Ok(None) | Err(StorageError::Filesystem { .. }) => {
            return Err(StorageError::MissingPrimaryFile(meta_path))
        }
        Err(e) => return Err(e),
    };

    for field in T::STRUCTURED_FIELDS {
        let path = dir.join(field.file);
        match read_json(&path).await? {
            Some(value) => {
                raw.insert(field.field.to_string(), value);
            }
            None => {
                raw.remove(field.field);
            }
        }
    }

    T::post_load(id, &mut raw);

    serde_json::from_value(Value::Object(raw)).map_err(|e| StorageError::MalformedField {
        path: dir.to_path_buf(),
        field: T::COLLECTION.to_string(),
        reason: e.to_string(),
    })
}

/// Split a serialized document into the meta object and per-field values.
pub(crate) fn split_document<T: Document>(
    doc: &T,
) -> Result<(Map<String, Value>, Vec<(&'static FieldFile, Value)>), StorageError> {
    let Value::Object(mut map) = serde_json::to_value(doc)? else {
        return Err(StorageError::MalformedField {
            path: PathBuf::new(),
            field: T::COLLECTION.to_string(),
            reason: "document does not serialize to a JSON object".to_string(),
        });
    };

    let mut structured = Vec::with_capacity(T::STRUCTURED_FIELDS.len());
    for field in T::STRUCTURED_FIELDS {
        let value = map.remove(field.field).unwrap_or(Value::Null);
        structured.push((field, value));
    }
    Ok((map, structured))
}
