//! Moves remapped values to where serde expects them before decoding.

use serde_json::Value;

use super::PathTable;
use super::table::Segment;
use crate::jsonptr;

/// A concrete data location plus the keys its wildcards matched.
struct Binding<'a> {
    value: &'a Value,
    keys: Vec<String>,
}

impl PathTable {
    /// Copy values from their data paths to their struct paths.
    ///
    /// Returns `merged` unchanged when no field uses a path override.
    /// Wildcards in the data path bind to the trailing wildcards of the
    /// struct path; remaining struct wildcards expand over the keys already
    /// present in the output tree.
    #[must_use]
    pub fn to_decode_tree(&self, merged: &Value) -> Value {
        let mut out = merged.clone();
        for entry in self.entries.iter().filter(|entry| entry.is_remapped()) {
            let mut bindings = Vec::new();
            collect(merged, &entry.data, Vec::new(), &mut bindings);
            for binding in bindings {
                let value = binding.value.clone();
                for target in targets(&out, &entry.structure, &binding.keys) {
                    if let Err(err) = jsonptr::set(&mut out, &target, value.clone()) {
                        tracing::debug!(path = %target, error = %err, "skipping remapped value");
                    }
                }
            }
        }
        out
    }
}

fn collect<'a>(node: &'a Value, path: &[Segment], keys: Vec<String>, out: &mut Vec<Binding<'a>>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(Binding { value: node, keys });
        return;
    };
    match head {
        Segment::Key(key) => {
            let child = match node {
                Value::Object(map) => map.get(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
                _ => None,
            };
            if let Some(child) = child {
                collect(child, rest, keys, out);
            }
        }
        Segment::Wildcard => {
            for (key, child) in children(node) {
                let mut next = keys.clone();
                next.push(key);
                collect(child, rest, next, out);
            }
        }
    }
}

fn children(node: &Value) -> Vec<(String, &Value)> {
    match node {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

/// Concrete struct pointers for one binding.
fn targets(out: &Value, structure: &[Segment], keys: &[String]) -> Vec<String> {
    let wildcards = structure
        .iter()
        .filter(|seg| matches!(seg, Segment::Wildcard))
        .count();
    let bound = keys.len().min(wildcards);
    let free = wildcards - bound;
    let fixed = keys.get(keys.len() - bound..).unwrap_or_default();
    let mut prefixes = vec![String::new()];
    let mut seen = 0;
    for seg in structure {
        prefixes = match seg {
            Segment::Key(key) => prefixes
                .iter()
                .map(|prefix| jsonptr::append(prefix, key))
                .collect(),
            Segment::Wildcard if seen < free => prefixes
                .iter()
                .flat_map(|prefix| {
                    jsonptr::get(out, prefix)
                        .map(children)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(key, _)| jsonptr::append(prefix, &key))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Segment::Wildcard => {
                let Some(key) = fixed.get(seen - free) else {
                    return Vec::new();
                };
                prefixes
                    .iter()
                    .map(|prefix| jsonptr::append(prefix, key))
                    .collect()
            }
        };
        if matches!(seg, Segment::Wildcard) {
            seen += 1;
        }
    }
    prefixes
}
