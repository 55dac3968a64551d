//! Priority merge with per-path origin tracking.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde_json::{Map, Value};

use crate::jsonptr;
use crate::layer::LayerName;

/// Which layer supplied each path of a merged tree.
///
/// Every path written by a layer is recorded, containers included, so the
/// owner of an object is the highest-priority layer that contributed to it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Origins(BTreeMap<String, LayerName>);

impl Origins {
    /// Owner of `path`, falling back to the nearest recorded ancestor.
    pub(crate) fn lookup(&self, path: &str) -> Option<&LayerName> {
        let mut current = path;
        loop {
            if let Some(name) = self.0.get(current) {
                return Some(name);
            }
            current = jsonptr::parent(current)?;
            if current.is_empty() {
                return None;
            }
        }
    }

    fn record(&mut self, path: &str, name: &LayerName) {
        if !path.is_empty() {
            self.0.insert(path.to_owned(), name.clone());
        }
    }

    fn clear_below(&mut self, path: &str) {
        let prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .0
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.0.remove(&key);
        }
    }
}

/// Result of merging every loaded layer.
#[derive(Clone, Debug)]
pub(crate) struct Merged {
    pub(crate) tree: Value,
    pub(crate) origins: Origins,
}

/// Overlay `layers` in order; later layers win.
///
/// Objects merge key by key; scalars, arrays and `null` replace the target
/// wholesale.
pub(crate) fn merge_layers<'a, I>(layers: I) -> Merged
where
    I: IntoIterator<Item = (&'a LayerName, &'a Value)>,
{
    let mut tree = Value::Object(Map::new());
    let mut origins = Origins::default();
    let mut path = String::new();
    for (name, data) in layers {
        overlay(&mut tree, data, &mut path, name, &mut origins);
    }
    Merged { tree, origins }
}

fn overlay(
    target: &mut Value,
    layer: &Value,
    path: &mut String,
    name: &LayerName,
    origins: &mut Origins,
) {
    let Value::Object(map) = layer else {
        if target.is_object() || target.is_array() {
            origins.clear_below(path);
        }
        *target = layer.clone();
        origins.record(path, name);
        return;
    };
    if !target.is_object() {
        if target.is_array() {
            origins.clear_below(path);
        }
        *target = Value::Object(Map::new());
    }
    origins.record(path, name);
    let Some(target_map) = target.as_object_mut() else {
        return;
    };
    for (key, value) in map {
        let len = path.len();
        path.push('/');
        path.push_str(&jsonptr::escape(key));
        let slot = target_map.entry(key.clone()).or_insert(Value::Null);
        overlay(slot, value, path, name, origins);
        path.truncate(len);
    }
}
