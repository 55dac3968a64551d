//! JSON documents.

use serde_json::Value;

use super::{Document, DocumentFormat, is_blank, object_root};
use crate::{JubakoError, JubakoResult};

/// JSON format handler. Output is pretty-printed with a trailing newline.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDocument;

impl Document for JsonDocument {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    fn parse(&self, bytes: &[u8]) -> JubakoResult<Value> {
        if is_blank(bytes) {
            return object_root(DocumentFormat::Json, Value::Null);
        }
        let value = serde_json::from_slice(bytes)
            .map_err(|err| JubakoError::parse(DocumentFormat::Json, err))?;
        object_root(DocumentFormat::Json, value)
    }

    fn marshal(&self, value: &Value) -> JubakoResult<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(value)
            .map_err(|err| JubakoError::parse(DocumentFormat::Json, err))?;
        out.push(b'\n');
        Ok(out)
    }
}
