//! YAML documents.

use serde_json::Value;

use super::{Document, DocumentFormat, is_blank, object_root};
use crate::{JubakoError, JubakoResult};

/// YAML format handler. Saves re-serialise the whole document.
#[derive(Clone, Copy, Debug, Default)]
pub struct YamlDocument;

impl Document for YamlDocument {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Yaml
    }

    fn parse(&self, bytes: &[u8]) -> JubakoResult<Value> {
        if is_blank(bytes) {
            return object_root(DocumentFormat::Yaml, Value::Null);
        }
        let value = serde_yaml::from_slice(bytes)
            .map_err(|err| JubakoError::parse(DocumentFormat::Yaml, err))?;
        object_root(DocumentFormat::Yaml, value)
    }

    fn marshal(&self, value: &Value) -> JubakoResult<Vec<u8>> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|err| JubakoError::parse(DocumentFormat::Yaml, err))
    }
}
