//! Dotted key paths over a JSON document.
//!
//! `aws.instance_id` addresses `{"aws": {"instance_id": …}}`. Writes create
//! missing intermediate objects but never replace a non-object value, so a
//! malformed key cannot silently clobber sibling data.

use serde_json::{Map, Value};

use crate::error::StateError;

/// Split a dotted key, rejecting empty segments.
fn segments(key: &str) -> Result<Vec<&str>, StateError> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|part| part.trim().is_empty()) {
        return Err(StateError::InvalidKey {
            key: key.to_owned(),
            reason: String::from("key segments must be non-empty"),
        });
    }
    Ok(parts)
}

/// Look up `key` in `document`.
#[must_use]
pub fn get_path<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

/// Set `key` to `value`, creating intermediate objects as needed.
///
/// # Errors
///
/// Returns `StateError::InvalidKey` for empty segments, or when an existing
/// intermediate value is not an object.
pub fn set_path(document: &mut Value, key: &str, value: Value) -> Result<(), StateError> {
    let parts = segments(key)?;
    let Some((&field, parents)) = parts.split_last() else {
        return Err(StateError::InvalidKey {
            key: key.to_owned(),
            reason: String::from("key is empty"),
        });
    };

    if document.is_null() {
        *document = Value::Object(Map::new());
    }

    let mut current = document;
    for &segment in parents {
        let Some(object) = current.as_object_mut() else {
            return Err(not_an_object(key, segment));
        };
        current = object
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let Some(object) = current.as_object_mut() else {
        return Err(not_an_object(key, field));
    };
    object.insert(field.to_owned(), value);
    Ok(())
}

/// Remove `key`, returning the previous value. Missing keys are not an error.
///
/// # Errors
///
/// Returns `StateError::InvalidKey` for empty segments.
pub fn remove_path(document: &mut Value, key: &str) -> Result<Option<Value>, StateError> {
    let parts = segments(key)?;
    let Some((&field, parents)) = parts.split_last() else {
        return Ok(None);
    };

    let mut current = document;
    for &segment in parents {
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(current
        .as_object_mut()
        .and_then(|object| object.remove(field)))
}

fn not_an_object(key: &str, segment: &str) -> StateError {
    StateError::InvalidKey {
        key: key.to_owned(),
        reason: format!("'{segment}' is inside a value that is not an object"),
    }
}
