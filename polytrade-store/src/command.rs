//! # Mutation command language
//!
//! The only three operations permitted to change a [`crate::Store`]. A
//! worker applies a batch locally, then forwards the identical sequence to
//! the host; both sides run the same [`apply`] logic, so byte-identical
//! delivery converges to byte-identical state (invariant 5).

use crate::path::{Path, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "op")]
pub enum Command {
    /// Set the leaf at `path`. Intermediate objects/arrays are created on
    /// demand. Writing array index `n` when the array's length is `n` is
    /// an append.
    Update { path: Path, value: Value },
    /// Splice out one array element; subsequent indices shift down by one.
    RemoveArrayElement { path: Path, index: usize },
    /// Delete a map entry. A missing key is a silent no-op (convergent on replay).
    RemoveObjectKey { path: Path, key: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("path {path} expected {expected}, found a different shape")]
    TypeMismatch { path: String, expected: &'static str },
    #[error("path {path} does not exist")]
    PathNotFound { path: String },
    #[error("index {index} out of bounds for array of length {len} at {path}")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Write `value` at `path`, auto-vivifying intermediate objects/arrays.
pub(crate) fn apply_update(root: &mut Value, path: &[PathSegment], value: Value) -> Result<(), StoreError> {
    let Some((head, rest)) = path.split_first() else {
        *root = value;
        return Ok(());
    };
    match head {
        PathSegment::Key(key) => {
            if root.is_null() {
                *root = Value::Object(Default::default());
            }
            let obj = root.as_object_mut().ok_or_else(|| StoreError::TypeMismatch {
                path: key.clone(),
                expected: "object",
            })?;
            let entry = obj.entry(key.clone()).or_insert(Value::Null);
            apply_update(entry, rest, value)
        }
        PathSegment::Index(index) => {
            if root.is_null() {
                *root = Value::Array(Vec::new());
            }
            let arr = root.as_array_mut().ok_or_else(|| StoreError::TypeMismatch {
                path: index.to_string(),
                expected: "array",
            })?;
            if *index == arr.len() {
                arr.push(Value::Null);
            } else if *index > arr.len() {
                return Err(StoreError::IndexOutOfBounds {
                    path: index.to_string(),
                    index: *index,
                    len: arr.len(),
                });
            }
            apply_update(&mut arr[*index], rest, value)
        }
    }
}

/// Navigate to an existing location without creating anything.
pub(crate) fn navigate<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, StoreError> {
    let mut current = root;
    for seg in path {
        current = match seg {
            PathSegment::Key(key) => current
                .as_object_mut()
                .ok_or_else(|| StoreError::TypeMismatch {
                    path: key.clone(),
                    expected: "object",
                })?
                .get_mut(key)
                .ok_or_else(|| StoreError::PathNotFound { path: key.clone() })?,
            PathSegment::Index(index) => current
                .as_array_mut()
                .ok_or_else(|| StoreError::TypeMismatch {
                    path: index.to_string(),
                    expected: "array",
                })?
                .get_mut(*index)
                .ok_or_else(|| StoreError::PathNotFound {
                    path: index.to_string(),
                })?,
        };
    }
    Ok(current)
}

pub(crate) fn apply_remove_array_element(
    root: &mut Value,
    path: &Path,
    index: usize,
) -> Result<(), StoreError> {
    let target = navigate(root, path.segments())?;
    let arr = target.as_array_mut().ok_or_else(|| StoreError::TypeMismatch {
        path: path.to_string(),
        expected: "array",
    })?;
    if index >= arr.len() {
        return Err(StoreError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len: arr.len(),
        });
    }
    arr.remove(index);
    Ok(())
}

pub(crate) fn apply_remove_object_key(root: &mut Value, path: &Path, key: &str) -> Result<(), StoreError> {
    let target = navigate(root, path.segments())?;
    let obj = target.as_object_mut().ok_or_else(|| StoreError::TypeMismatch {
        path: path.to_string(),
        expected: "object",
    })?;
    obj.shift_remove(key);
    Ok(())
}

impl Command {
    pub(crate) fn apply(&self, root: &mut Value) -> Result<(), StoreError> {
        match self {
            Command::Update { path, value } => apply_update(root, path.segments(), value.clone()),
            Command::RemoveArrayElement { path, index } => {
                apply_remove_array_element(root, path, *index)
            }
            Command::RemoveObjectKey { path, key } => apply_remove_object_key(root, path, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_autovivifies_nested_objects() {
        let mut root = Value::Object(Default::default());
        let path: Path = "binance.public.tickers.BTCUSDT.bid".into();
        Command::Update {
            path,
            value: json!(100.5),
        }
        .apply(&mut root)
        .unwrap();
        assert_eq!(
            root["binance"]["public"]["tickers"]["BTCUSDT"]["bid"],
            json!(100.5)
        );
    }

    #[test]
    fn update_at_array_len_appends() {
        let mut root = json!({"a": {"orders": []}});
        let path: Path = "a.orders.0".into();
        Command::Update {
            path,
            value: json!({"id": "O1"}),
        }
        .apply(&mut root)
        .unwrap();
        assert_eq!(root["a"]["orders"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn update_past_array_len_is_rejected() {
        let mut root = json!({"a": {"orders": []}});
        let path: Path = "a.orders.5".into();
        let err = Command::Update {
            path,
            value: json!({"id": "O1"}),
        }
        .apply(&mut root)
        .unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn remove_array_element_shifts_subsequent_indices() {
        let mut root = json!({"a": {"orders": [1, 2, 3]}});
        let path: Path = "a.orders".into();
        Command::RemoveArrayElement { path, index: 0 }
            .apply(&mut root)
            .unwrap();
        assert_eq!(root["a"]["orders"], json!([2, 3]));
    }

    #[test]
    fn remove_object_key_deletes_entry() {
        let mut root = json!({"a": {"private": {"ACC1": {}, "ACC2": {}}}});
        let path: Path = "a.private".into();
        Command::RemoveObjectKey {
            path,
            key: "ACC1".to_string(),
        }
        .apply(&mut root)
        .unwrap();
        assert!(root["a"]["private"].get("ACC1").is_none());
        assert!(root["a"]["private"].get("ACC2").is_some());
    }

    #[test]
    fn remove_object_key_on_missing_key_is_a_no_op() {
        let mut root = json!({"a": {"private": {}}});
        let path: Path = "a.private".into();
        Command::RemoveObjectKey {
            path,
            key: "GHOST".to_string(),
        }
        .apply(&mut root)
        .unwrap();
        assert_eq!(root["a"]["private"], json!({}));
    }
}
