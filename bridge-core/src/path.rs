//! Nested dot-path access over JSON values.
//!
//! `a.b.c` walks object keys; a numeric segment also indexes into arrays.
//! All functions are total: a missing path reads as `None`, which is distinct
//! from an explicit `Some(Value::Null)`.

use serde_json::{Map, Value};

/// Read the value at a dot-separated path.
#[must_use]
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    get_segments(value, &split(path))
}

/// Read the value at a pre-split path.
#[must_use]
pub fn get_segments<'a, S: AsRef<str>>(value: &'a Value, segments: &[S]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| child(current, segment.as_ref()))
}

/// Write `new_value` at a dot-separated path, creating intermediate objects.
pub fn set(target: &mut Value, path: &str, new_value: Value) {
    set_segments(target, &split(path), new_value);
}

/// Write `new_value` at a pre-split path, creating intermediate objects.
///
/// Intermediates that are neither objects nor indexable arrays are replaced by
/// empty objects. An empty path replaces `target` itself.
pub fn set_segments<S: AsRef<str>>(target: &mut Value, segments: &[S], new_value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = new_value;
        return;
    };
    let key = first.as_ref();

    if let Value::Array(items) = target {
        if let Ok(index) = key.parse::<usize>() {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            set_segments(&mut items[index], rest, new_value);
            return;
        }
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        if rest.is_empty() {
            map.insert(key.to_string(), new_value);
        } else {
            let slot = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_segments(slot, rest, new_value);
        }
    }
}

/// Remove and return the value at a dot-separated path.
pub fn remove(target: &mut Value, path: &str) -> Option<Value> {
    remove_segments(target, &split(path))
}

/// Remove and return the value at a pre-split path.
pub fn remove_segments<S: AsRef<str>>(target: &mut Value, segments: &[S]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let parent = parents
        .iter()
        .try_fold(target, |current, segment| child_mut(current, segment.as_ref()))?;
    match parent {
        Value::Object(map) => map.remove(last.as_ref()),
        Value::Array(items) => {
            let index = last.as_ref().parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Split a dot path into its segments.
#[must_use]
pub fn split(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}
