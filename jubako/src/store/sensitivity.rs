//! Sensitive-field placement checks and masking.

use serde_json::Value;

use crate::jsonptr;
use crate::schema::PathTable;

/// Paths in `tree` that the schema marks sensitive and hold a non-null
/// value. Descendants of a reported path are not reported again.
pub(crate) fn sensitive_paths(table: &PathTable, tree: &Value) -> Vec<String> {
    let mut found = Vec::new();
    if table.has_sensitive() {
        let mut path = String::new();
        visit(table, tree, &mut path, &mut found);
    }
    found
}

fn visit(table: &PathTable, value: &Value, path: &mut String, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                visit_child(table, key, child, path, found);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                visit_child(table, &index.to_string(), child, path, found);
            }
        }
        _ => {}
    }
}

fn visit_child(
    table: &PathTable,
    key: &str,
    child: &Value,
    path: &mut String,
    found: &mut Vec<String>,
) {
    let len = path.len();
    path.push('/');
    path.push_str(&jsonptr::escape(key));
    if table.is_sensitive(path) {
        if !child.is_null() {
            found.push(path.clone());
        }
    } else {
        visit(table, child, path, found);
    }
    path.truncate(len);
}

/// Replace every sensitive value below `base` inside `value` with the
/// output of `mask`. Returns `true` when anything was masked.
pub(crate) fn mask_descendants(
    table: &PathTable,
    base: &str,
    value: &mut Value,
    mask: &dyn Fn(&str, &Value) -> Value,
) -> bool {
    let mut masked = false;
    let targets = {
        let mut path = base.to_owned();
        let mut found = Vec::new();
        visit(table, value, &mut path, &mut found);
        found
    };
    for target in targets {
        let Some(relative) = target.strip_prefix(base) else {
            continue;
        };
        if let Some(slot) = value.pointer_mut(relative) {
            *slot = mask(&target, slot);
            masked = true;
        }
    }
    masked
}
