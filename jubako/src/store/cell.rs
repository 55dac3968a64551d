//! Read-side views of the merged tree.

use serde_json::Value;

use super::options::Priority;
use crate::document::DocumentFormat;
use crate::jsonptr;
use crate::layer::LayerName;

/// Value at one path of the merged tree, annotated with its origin.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// The value, its masked representation, or `null` when absent.
    pub value: Value,
    /// Whether the path exists in the merged tree.
    pub exists: bool,
    /// Layer that supplied the value.
    pub layer: Option<LayerName>,
    /// Whether the schema marks the path sensitive.
    pub sensitive: bool,
    /// Whether [`Cell::value`] was masked.
    pub masked: bool,
}

impl Cell {
    pub(super) const fn missing(sensitive: bool) -> Self {
        Self {
            value: Value::Null,
            exists: false,
            layer: None,
            sensitive,
            masked: false,
        }
    }

    /// Name of the layer that supplied the value.
    #[must_use]
    pub fn layer_name(&self) -> Option<&str> {
        self.layer.as_ref().map(LayerName::as_str)
    }
}

/// Node visited by [`crate::store::Store::walk`].
#[derive(Clone, Copy, Debug)]
pub struct WalkContext<'a> {
    /// JSON Pointer of the node; empty for the root.
    pub path: &'a str,
    /// Unmasked value of the node.
    pub value: &'a Value,
    /// Whether the schema marks the path sensitive.
    pub sensitive: bool,
    /// Layer that supplied the node.
    pub layer: Option<&'a LayerName>,
}

/// Registration and load state of one layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer name.
    pub name: LayerName,
    /// Merge priority.
    pub priority: Priority,
    /// Whether the layer may hold sensitive fields.
    pub sensitive: bool,
    /// Diagnostic kind such as `file` or `env`.
    pub kind: &'static str,
    /// Document format, if any.
    pub format: Option<DocumentFormat>,
    /// Whether the layer accepts writes.
    pub can_save: bool,
    /// Whether the layer holds loaded data.
    pub loaded: bool,
    /// Whether the layer has unsaved edits.
    pub dirty: bool,
}

/// Depth-first walk. A `false` from `visit` skips the node's children.
pub(super) fn walk<'a, F>(value: &'a Value, path: &mut String, visit: &mut F)
where
    F: FnMut(&str, &'a Value) -> bool,
{
    if !visit(path, value) {
        return;
    }
    let len = path.len();
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push('/');
                path.push_str(&jsonptr::escape(key));
                walk(child, path, visit);
                path.truncate(len);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push('/');
                path.push_str(&index.to_string());
                walk(child, path, visit);
                path.truncate(len);
            }
        }
        _ => {}
    }
}
