//! Document formats and patch application.
//!
//! A [`Document`] is a stateless handler that turns bytes into a
//! [`serde_json::Value`] tree and back. Edits are described as a
//! [`PatchSet`] so formats that can edit text in place (TOML) keep comments
//! and layout intact.

mod json;
mod patch;
#[cfg(feature = "toml")]
mod toml_doc;
#[cfg(feature = "yaml")]
mod yaml;

use std::fmt;

use serde_json::{Map, Value};

use crate::{JubakoError, JubakoResult, jsonptr};

pub use json::JsonDocument;
pub use patch::{Patch, PatchOp, PatchSet};
#[cfg(feature = "toml")]
pub use toml_doc::TomlDocument;
#[cfg(feature = "yaml")]
pub use yaml::YamlDocument;

/// Identifier of a document format.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DocumentFormat {
    /// JSON.
    Json,
    /// TOML.
    Toml,
    /// YAML.
    Yaml,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
        })
    }
}

/// A configuration file format.
///
/// Implementations hold no per-document state; the parsed tree is owned by
/// the layer that loaded it.
pub trait Document: fmt::Debug + Send + Sync {
    /// Format handled by this document.
    fn format(&self) -> DocumentFormat;

    /// Parse `bytes` into an object tree. Empty input yields `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::Parse`] when the bytes are not valid for the
    /// format or the root is not an object.
    fn parse(&self, bytes: &[u8]) -> JubakoResult<Value>;

    /// Look up `path` in the parsed bytes. The empty path is the root.
    ///
    /// # Errors
    ///
    /// Propagates [`Document::parse`] failures.
    fn get(&self, bytes: &[u8], path: &str) -> JubakoResult<Option<Value>> {
        let tree = self.parse(bytes)?;
        Ok(jsonptr::get(&tree, path).cloned())
    }

    /// Serialise `value` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::Parse`] when the value cannot be represented.
    fn marshal(&self, value: &Value) -> JubakoResult<Vec<u8>>;

    /// Apply `patches` to `original` and return the new bytes.
    ///
    /// The default implementation parses, patches the tree and marshals the
    /// result, so comments are not preserved.
    ///
    /// # Errors
    ///
    /// Propagates parse, patch and marshal failures.
    fn apply(&self, original: &[u8], patches: &PatchSet) -> JubakoResult<Vec<u8>> {
        let mut tree = self.parse(original)?;
        patches.apply_to(&mut tree)?;
        self.marshal(&tree)
    }
}

/// Returns `true` when `bytes` holds nothing but whitespace.
pub(crate) fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Treat `null` as an empty document and reject non-object roots.
pub(crate) fn object_root(format: DocumentFormat, value: Value) -> JubakoResult<Value> {
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(JubakoError::parse(
            format,
            format!("document root must be an object, found {}", kind_name(&other)),
        )),
    }
}

const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Pick a document handler from a file extension.
///
/// ```rust
/// use jubako::document::{DocumentFormat, for_extension};
///
/// let doc = for_extension("json").expect("json is always available");
/// assert_eq!(doc.format(), DocumentFormat::Json);
/// assert!(for_extension("ini").is_none());
/// ```
#[must_use]
pub fn for_extension(ext: &str) -> Option<std::sync::Arc<dyn Document>> {
    match ext.to_ascii_lowercase().as_str() {
        "json" => Some(std::sync::Arc::new(JsonDocument)),
        #[cfg(feature = "toml")]
        "toml" => Some(std::sync::Arc::new(TomlDocument)),
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Some(std::sync::Arc::new(YamlDocument)),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
