//! Incremental mutation of topic values
//!
//! All operations work on the value in place; callers hand in the value that
//! lives inside the topic's watch channel. A path that cannot be applied is
//! rejected before anything is touched.

use serde_json::{Map, Value};

use crate::protocol::{Op, PathKey};
use crate::types::{LinkError, LinkResult};

/// Apply one operation to a topic value
pub fn apply_op(target: &mut Value, op: Op, path: &[PathKey], value: Value) -> LinkResult<()> {
    match op {
        Op::Full => *target = value,
        Op::Add | Op::Set if path.is_empty() => *target = value,
        Op::Add | Op::Set => deep_set(target, path, value)?,
        Op::Del if path.is_empty() => *target = Value::Null,
        Op::Del => deep_delete(target, path),
    }
    Ok(())
}

/// Set `value` at `path`, creating intermediate containers as needed.
///
/// A string key turns a non-object into an object; an index key turns a
/// non-array into an array. An index may address an existing element or
/// append one past the end; anything further out is rejected and the value
/// is left unchanged.
pub fn deep_set(target: &mut Value, path: &[PathKey], value: Value) -> LinkResult<()> {
    check_set_path(target, path)?;

    let Some((last, parents)) = path.split_last() else {
        *target = value;
        return Ok(());
    };

    let mut cursor = target;
    for key in parents {
        cursor = child_mut(cursor, key).ok_or_else(|| out_of_range(key))?;
    }
    *child_mut(cursor, last).ok_or_else(|| out_of_range(last))? = value;
    Ok(())
}

/// Walk `path` read-only and make sure every index step stays in range
fn check_set_path(target: &Value, path: &[PathKey]) -> LinkResult<()> {
    let mut cursor = Some(target);
    for key in path {
        let PathKey::Index(i) = key else {
            cursor = cursor.and_then(|v| v.as_object()).and_then(|m| m.get(&key.to_string()));
            continue;
        };
        cursor = match cursor {
            Some(Value::Object(map)) => map.get(&key.to_string()),
            Some(Value::Array(items)) if *i <= items.len() => items.get(*i),
            Some(Value::Array(items)) => {
                return Err(LinkError::Malformed(format!(
                    "path index {} out of range for array of {}",
                    i,
                    items.len()
                )))
            }
            // A fresh array is created here; only index 0 appends
            _ if *i == 0 => None,
            _ => return Err(out_of_range(key)),
        };
    }
    Ok(())
}

fn out_of_range(key: &PathKey) -> LinkError {
    LinkError::Malformed(format!("path index {} out of range", key))
}

/// Remove the entry at `path`. Missing intermediate entries are a no-op.
pub fn deep_delete(target: &mut Value, path: &[PathKey]) {
    let Some((last, parents)) = path.split_last() else {
        *target = Value::Null;
        return;
    };

    let mut cursor = target;
    for key in parents {
        match lookup_mut(cursor, key) {
            Some(next) => cursor = next,
            None => return,
        }
    }

    match (cursor, last) {
        (Value::Object(map), key) => {
            map.remove(&key.to_string());
        }
        (Value::Array(items), PathKey::Index(i)) if *i < items.len() => {
            items.remove(*i);
        }
        _ => {}
    }
}

fn lookup_mut<'a>(value: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match (value, key) {
        (Value::Object(map), key) => map.get_mut(&key.to_string()),
        (Value::Array(items), PathKey::Index(i)) => items.get_mut(*i),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match key {
        PathKey::Index(i) if !value.is_object() => {
            if !value.is_array() {
                *value = Value::Array(Vec::new());
            }
            let Value::Array(items) = value else {
                return None;
            };
            if *i == items.len() {
                items.push(Value::Null);
            }
            items.get_mut(*i)
        }
        _ => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            let Value::Object(map) = value else {
                return None;
            };
            Some(map.entry(key.to_string()).or_insert(Value::Null))
        }
    }
}
