//! JSON Pointer (RFC 6901) helpers and path-addressed tree edits.
//!
//! Paths look like `/server/port` or `/servers/0/host`. `~` is escaped as
//! `~0` and `/` as `~1`; the empty string addresses the document root.
//! Numeric segments index arrays.
//!
//! # Examples
//!
//! ```rust
//! use jubako::jsonptr;
//! use serde_json::json;
//!
//! let mut tree = json!({"server": {"port": 8080}});
//! jsonptr::set(&mut tree, "/server/host", json!("localhost"))?;
//! assert_eq!(jsonptr::get(&tree, "/server/host"), Some(&json!("localhost")));
//! assert_eq!(jsonptr::build(["a/b", "c~d"]), "/a~1b/c~0d");
//! # Ok::<_, std::sync::Arc<jubako::JubakoError>>(())
//! ```

use serde_json::{Map, Value};

use crate::{JubakoError, JubakoResult};

/// Escape a single key for use as a pointer segment.
#[must_use]
pub fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Reverse [`escape`] for a single segment.
///
/// # Errors
///
/// Returns [`JubakoError::InvalidPath`] when `~` is not followed by `0` or `1`.
pub fn unescape(segment: &str) -> JubakoResult<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(JubakoError::invalid_path(
                    segment,
                    "'~' must be followed by '0' or '1'",
                ));
            }
        }
    }
    Ok(out)
}

/// Build a pointer from unescaped keys.
#[must_use]
pub fn build<I, S>(keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter().fold(String::new(), |mut acc, key| {
        acc.push('/');
        acc.push_str(&escape(key.as_ref()));
        acc
    })
}

/// Append one unescaped key to an existing pointer.
#[must_use]
pub fn append(base: &str, key: &str) -> String {
    format!("{base}/{}", escape(key))
}

/// Split a pointer into unescaped keys.
///
/// # Errors
///
/// Returns [`JubakoError::InvalidPath`] when a non-empty path does not start
/// with `/` or contains an invalid escape.
pub fn parse(path: &str) -> JubakoResult<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(JubakoError::invalid_path(path, "pointer must start with '/'"));
    };
    rest.split('/').map(unescape).collect()
}

/// Returns the parent pointer of `path`, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(head, _)| head)
}

/// Look up `path` in `root`. The empty path returns `root`.
#[must_use]
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    root.pointer(path)
}

/// Set `value` at `path`, creating intermediate objects as needed.
///
/// Non-container intermediates are overwritten with objects. For arrays,
/// `-` or an index equal to the length appends.
///
/// # Errors
///
/// Returns [`JubakoError::InvalidPath`] for the empty path, malformed
/// pointers, non-numeric segments addressing arrays and indices past the
/// end of an array.
pub fn set(root: &mut Value, path: &str, value: Value) -> JubakoResult<()> {
    let segments = parse(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(JubakoError::invalid_path(path, "cannot set the document root"));
    };
    let mut current = root;
    for segment in parents {
        current = child_or_insert(current, segment, path)?;
    }
    insert_at(current, last, value, path)
}

/// Remove the value at `path`. Removing an absent path is not an error.
///
/// Returns `true` when a value was removed.
///
/// # Errors
///
/// Returns [`JubakoError::InvalidPath`] for the empty path or a malformed
/// pointer.
pub fn delete(root: &mut Value, path: &str) -> JubakoResult<bool> {
    let segments = parse(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(JubakoError::invalid_path(path, "cannot delete the document root"));
    };
    let mut current = root;
    for segment in parents {
        let next = match current {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get_mut(idx)),
            _ => None,
        };
        let Some(next) = next else {
            return Ok(false);
        };
        current = next;
    }
    Ok(match current {
        Value::Object(map) => map.shift_remove(last).is_some(),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(idx) if idx < items.len() => {
                items.remove(idx);
                true
            }
            _ => false,
        },
        _ => false,
    })
}

fn array_index(segment: &str, len: usize, path: &str) -> JubakoResult<usize> {
    if segment == "-" {
        return Ok(len);
    }
    let leading_zero = segment.len() > 1 && segment.starts_with('0');
    match segment.parse::<usize>() {
        Ok(idx) if !leading_zero && idx <= len => Ok(idx),
        Ok(_) if !leading_zero => Err(JubakoError::invalid_path(
            path,
            format!("index {segment} is past the end of an array of length {len}"),
        )),
        _ => Err(JubakoError::invalid_path(
            path,
            format!("segment '{segment}' is not a valid array index"),
        )),
    }
}

fn ensure_object<'a>(node: &'a mut Value, path: &str) -> JubakoResult<&'a mut Map<String, Value>> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return Err(JubakoError::invalid_path(path, "expected an object"));
    };
    Ok(map)
}

fn child_or_insert<'a>(
    node: &'a mut Value,
    segment: &str,
    path: &str,
) -> JubakoResult<&'a mut Value> {
    let slot = if let Value::Array(items) = node {
        let idx = array_index(segment, items.len(), path)?;
        if idx == items.len() {
            items.push(Value::Object(Map::new()));
        }
        items
            .get_mut(idx)
            .ok_or_else(|| JubakoError::invalid_path(path, "array index out of range"))?
    } else {
        ensure_object(node, path)?
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()))
    };
    if !slot.is_object() && !slot.is_array() {
        *slot = Value::Object(Map::new());
    }
    Ok(slot)
}

fn insert_at(node: &mut Value, last: &str, value: Value, path: &str) -> JubakoResult<()> {
    if let Value::Array(items) = node {
        let idx = array_index(last, items.len(), path)?;
        if let Some(slot) = items.get_mut(idx) {
            *slot = value;
        } else {
            items.push(value);
        }
        return Ok(());
    }
    ensure_object(node, path)?.insert(last.to_owned(), value);
    Ok(())
}
