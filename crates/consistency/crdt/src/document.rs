//! Dot-path access into a JSON object document.

use serde_json::{Map, Value};

use crate::error::CrdtError;
use crate::operation::OperationKind;

fn malformed(msg: String) -> CrdtError {
    CrdtError::MalformedOperation(msg)
}

/// The value at `path`, if every segment resolves through objects.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Apply one effect at `path`, creating intermediate objects as needed.
///
/// `set_semantics` makes `Append` skip values already present.
pub fn apply(
    root: &mut Value,
    path: &str,
    kind: &OperationKind,
    set_semantics: bool,
) -> Result<(), CrdtError> {
    let (parent_path, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (Some(parent), key),
        None => (None, path),
    };

    if let OperationKind::Delete = kind {
        let parent = match parent_path {
            Some(p) => get_mut(root, p)?,
            None => Some(&mut *root),
        };
        if let Some(parent) = parent {
            let object = parent
                .as_object_mut()
                .ok_or_else(|| malformed(format!("delete '{}': parent is not an object", path)))?;
            object.remove(key);
        }
        return Ok(());
    }

    let parent = match parent_path {
        Some(p) => ensure_object(root, p)?,
        None => root,
    };
    let object = parent
        .as_object_mut()
        .ok_or_else(|| malformed(format!("'{}': parent is not an object", path)))?;

    match kind {
        OperationKind::Set(value) => {
            object.insert(key.to_string(), value.clone());
        }
        OperationKind::Delete => {}
        OperationKind::Increment(_) | OperationKind::Decrement(_) => {
            let delta = kind.delta().unwrap_or(0.0);
            let current = match object.get(key) {
                None | Some(Value::Null) => 0.0,
                Some(Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| malformed(format!("'{}': number out of range", path)))?,
                Some(_) => {
                    return Err(malformed(format!(
                        "{} on non-numeric value at '{}'",
                        kind.type_name(),
                        path
                    )))
                }
            };
            let next = number(current + delta)
                .ok_or_else(|| malformed(format!("'{}': result is not finite", path)))?;
            object.insert(key.to_string(), next);
        }
        OperationKind::Append(value) => match object.get_mut(key) {
            None | Some(Value::Null) => {
                object.insert(key.to_string(), Value::Array(vec![value.clone()]));
            }
            Some(Value::Array(items)) => {
                if !(set_semantics && items.contains(value)) {
                    items.push(value.clone());
                }
            }
            Some(_) => {
                return Err(malformed(format!("append on non-list value at '{}'", path)));
            }
        },
        OperationKind::Merge(entries) => match object.get_mut(key) {
            None | Some(Value::Null) => {
                object.insert(key.to_string(), Value::Object(entries.clone()));
            }
            Some(Value::Object(existing)) => {
                for (k, v) in entries {
                    existing.insert(k.clone(), v.clone());
                }
            }
            Some(_) => {
                return Err(malformed(format!("merge on non-object value at '{}'", path)));
            }
        },
    }
    Ok(())
}

/// Integral results stay integers so documents read back naturally.
pub(crate) fn number(value: f64) -> Option<Value> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Some(Value::from(value as i64))
    } else {
        serde_json::Number::from_f64(value).map(Value::Number)
    }
}

fn get_mut<'a>(root: &'a mut Value, path: &str) -> Result<Option<&'a mut Value>, CrdtError> {
    let mut current = root;
    for segment in path.split('.') {
        let object = current
            .as_object_mut()
            .ok_or_else(|| malformed(format!("path '{}' traverses a non-object", path)))?;
        match object.get_mut(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn ensure_object<'a>(root: &'a mut Value, path: &str) -> Result<&'a mut Value, CrdtError> {
    let mut current = root;
    for segment in path.split('.') {
        let object = current
            .as_object_mut()
            .ok_or_else(|| malformed(format!("path '{}' traverses a non-object", path)))?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(current)
}
