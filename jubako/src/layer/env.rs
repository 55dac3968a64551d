//! Environment variable layer.
//!
//! Two kinds of variables are collected:
//!
//! - prefixed variables, where the prefix is stripped, keys are lowercased
//!   and the separator (default `__`) nests keys, so `APP_SERVER__PORT=80`
//!   becomes `/server/port`;
//! - variables bound to schema fields with `#[jubako(env = "...")]`, which
//!   are coerced to the field's value kind and win over prefixed ones.
//!
//! Values containing commas become arrays unless they look like structured
//! data (starting with `[` or `{` or a quote), so `APP_TAGS=a,b,c` decodes
//! into a `Vec<String>`. Values with embedded commas must be quoted or
//! bracketed to avoid being split.

use async_trait::async_trait;
use figment::providers::Env;
use serde_json::{Map, Number, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Layer, LayerName};
use crate::schema::{EntryKind, PathTable, Schema, ValueKind};
use crate::source::ensure_active;
use crate::{JubakoDecodeExt, JubakoError, JubakoResult, jsonptr};

const DEFAULT_SEPARATOR: &str = "__";

#[derive(Clone, Debug)]
struct Binding {
    var: String,
    path: String,
    kind: EntryKind,
}

/// Layer reading configuration from environment variables.
///
/// Read-only; the variables are re-read on every load.
///
/// # Examples
///
/// ```rust
/// use jubako::layer::EnvLayer;
///
/// let layer = EnvLayer::prefixed("env", "APP_").separator("__");
/// let _ = layer;
/// ```
#[derive(Clone, Debug)]
pub struct EnvLayer {
    name: LayerName,
    prefix: Option<String>,
    separator: String,
    bindings: Vec<Binding>,
}

impl EnvLayer {
    /// Create a layer that only reads explicitly bound variables.
    pub fn new(name: impl Into<LayerName>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            separator: DEFAULT_SEPARATOR.to_owned(),
            bindings: Vec::new(),
        }
    }

    /// Create a layer reading every variable starting with `prefix`.
    pub fn prefixed(name: impl Into<LayerName>, prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::new(name)
        }
    }

    /// Nest keys at `pattern` instead of `__`.
    #[must_use]
    pub fn separator(mut self, pattern: impl Into<String>) -> Self {
        self.separator = pattern.into();
        self
    }

    /// Bind `var` to the pointer `path`. The value is decoded as JSON when
    /// possible and kept as a string otherwise.
    #[must_use]
    pub fn bind(mut self, var: impl Into<String>, path: impl Into<String>) -> Self {
        self.bindings.push(Binding {
            var: var.into(),
            path: path.into(),
            kind: EntryKind::Leaf(ValueKind::Any),
        });
        self
    }

    /// Add the `#[jubako(env = "...")]` bindings declared by `T`.
    #[must_use]
    pub fn with_schema<T: Schema + ?Sized>(self) -> Self {
        self.with_table(&PathTable::build::<T>())
    }

    /// Add the environment bindings recorded in `table`.
    #[must_use]
    pub fn with_table(mut self, table: &PathTable) -> Self {
        self.bindings
            .extend(table.env_bindings().filter_map(|entry| {
                entry.env().map(|var| Binding {
                    var: var.to_owned(),
                    path: entry.data_path().to_owned(),
                    kind: entry.kind(),
                })
            }));
        self
    }

    /// Read the environment into a tree.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::Source`] when a bound variable cannot be
    /// coerced to its field's kind.
    pub fn collect(&self) -> JubakoResult<Value> {
        let mut tree = Value::Object(Map::new());
        if let Some(prefix) = &self.prefix {
            let env = Env::prefixed(prefix).split(self.separator.as_str());
            for (key, raw) in env.iter() {
                if key.as_str().is_empty() {
                    continue;
                }
                let path = jsonptr::build(key.as_str().split('.'));
                jsonptr::set(&mut tree, &path, parse_value(&raw)?)?;
            }
        }
        for binding in &self.bindings {
            let Some(raw) = Env::var(&binding.var) else {
                continue;
            };
            let value = coerce(binding, &raw)?;
            debug!(var = %binding.var, path = %binding.path, "bound environment variable");
            jsonptr::set(&mut tree, &binding.path, value)?;
        }
        Ok(tree)
    }
}

/// The value is treated as CSV when it contains a comma and does not start
/// with `[` , `{`, `"` or `'`.
fn should_parse_as_csv(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.contains(',') && !matches!(trimmed.chars().next(), Some('[' | '{' | '"' | '\''))
}

fn parse_scalar(raw: &str) -> JubakoResult<Value> {
    let trimmed = raw.trim();
    let parsed = trimmed
        .parse::<figment::value::Value>()
        .unwrap_or_else(|_| figment::value::Value::from(trimmed.to_owned()));
    serde_json::to_value(parsed).into_jubako_decode()
}

fn parse_value(raw: &str) -> JubakoResult<Value> {
    let trimmed = raw.trim();
    if should_parse_as_csv(trimmed) {
        Ok(split_list(trimmed))
    } else {
        parse_scalar(trimmed)
    }
}

fn split_list(raw: &str) -> Value {
    Value::Array(
        raw.split(',')
            .map(|item| Value::String(item.trim().to_owned()))
            .collect(),
    )
}

fn coerce(binding: &Binding, raw: &str) -> JubakoResult<Value> {
    let trimmed = raw.trim();
    let invalid = |expected: &str| {
        JubakoError::source(
            binding.var.as_str(),
            format!("expected {expected} for '{}', found '{trimmed}'", binding.path),
        )
    };
    match binding.kind {
        EntryKind::Leaf(ValueKind::String) => Ok(Value::String(trimmed.to_owned())),
        EntryKind::Leaf(ValueKind::Bool) => trimmed
            .to_ascii_lowercase()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid("a boolean")),
        EntryKind::Leaf(ValueKind::Integer) => trimmed
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| trimmed.parse::<u64>().map(Value::from))
            .map_err(|_| invalid("an integer")),
        EntryKind::Leaf(ValueKind::Float) => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("a number")),
        EntryKind::Leaf(ValueKind::Array) | EntryKind::Sequence if !trimmed.starts_with('[') => {
            Ok(if trimmed.is_empty() {
                Value::Array(Vec::new())
            } else {
                split_list(trimmed)
            })
        }
        _ => serde_json::from_str(trimmed).or_else(|_| parse_value(trimmed)),
    }
}

#[async_trait]
impl Layer for EnvLayer {
    fn name(&self) -> &LayerName {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "env"
    }

    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Value> {
        ensure_active(ctx)?;
        self.collect()
            .map_err(|err| JubakoError::in_layer(self.name.as_str(), err))
    }
}
