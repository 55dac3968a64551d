//! Static descriptions of configuration types.

use std::fmt;

/// Lazily evaluated shape of a nested type.
///
/// Field shapes are stored as function pointers so recursive types can be
/// described without evaluating their shape eagerly.
pub type ShapeFn = fn() -> Shape;

/// Kind of value stored at a leaf path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ValueKind {
    /// `true` or `false`.
    Bool,
    /// Signed or unsigned integer.
    Integer,
    /// Floating-point number.
    Float,
    /// UTF-8 string, including string-encoded types such as paths.
    String,
    /// Sequence of leaf values.
    Array,
    /// Map of leaf values.
    Map,
    /// Opaque value decoded by the field's own `Deserialize` impl.
    Any,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Structural description of a type, produced by [`crate::Schema::shape`].
#[derive(Clone, Debug)]
pub enum Shape {
    /// A value that is never recursed into.
    Leaf(ValueKind),
    /// A struct with named fields.
    Object(ObjectShape),
    /// A sequence whose elements share one shape.
    Sequence(ShapeFn),
    /// A string-keyed map whose values share one shape.
    Map(ShapeFn),
}

impl Shape {
    /// Shorthand for [`Shape::Object`].
    #[must_use]
    pub const fn object(type_name: &'static str, fields: Vec<FieldShape>) -> Self {
        Self::Object(ObjectShape { type_name, fields })
    }

    /// Returns `true` when the shape contains a struct somewhere below it.
    ///
    /// Collections of structured values receive a wildcard segment in the
    /// path table; collections of plain values are leaves.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::Object(_) => true,
            Self::Sequence(inner) | Self::Map(inner) => inner().is_structured(),
        }
    }
}

/// Fields of a struct shape.
#[derive(Clone, Debug)]
pub struct ObjectShape {
    /// Rust type name used to stop at recursive types.
    pub type_name: &'static str,
    /// Declared fields in declaration order.
    pub fields: Vec<FieldShape>,
}

/// One named field of a struct shape.
///
/// # Examples
///
/// ```rust
/// use jubako::schema::{FieldShape, Schema};
///
/// let field = FieldShape::new("api_key", "apiKey", <String as Schema>::shape)
///     .with_path("/secrets/api")
///     .with_env("API_KEY")
///     .sensitive(true);
/// assert_eq!(field.key(), "apiKey");
/// assert!(field.is_sensitive());
/// ```
#[derive(Clone, Debug)]
pub struct FieldShape {
    rust_name: &'static str,
    key: String,
    shape: ShapeFn,
    path: Option<String>,
    env: Option<String>,
    sensitive: bool,
    flatten: bool,
}

impl FieldShape {
    /// Describe a field named `rust_name` stored under the serde key `key`.
    #[must_use]
    pub fn new(rust_name: &'static str, key: impl Into<String>, shape: ShapeFn) -> Self {
        Self {
            rust_name,
            key: key.into(),
            shape,
            path: None,
            env: None,
            sensitive: false,
            flatten: false,
        }
    }

    /// Override where the value lives in layer data.
    ///
    /// Paths starting with `/` are absolute; others are relative to the
    /// enclosing struct.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Bind the field to an environment variable.
    #[must_use]
    pub fn with_env(mut self, var: impl Into<String>) -> Self {
        self.env = Some(var.into());
        self
    }

    /// Mark the field as holding secret data.
    #[must_use]
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    /// Inline the nested struct's fields into the enclosing struct.
    #[must_use]
    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Rust identifier of the field.
    #[must_use]
    pub const fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Serde key of the field.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Evaluate the field's shape.
    #[must_use]
    pub fn shape(&self) -> Shape {
        (self.shape)()
    }

    /// Path override, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Environment variable binding, if any.
    #[must_use]
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// Whether the field was marked sensitive.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Whether the field is flattened into its parent.
    #[must_use]
    pub const fn is_flattened(&self) -> bool {
        self.flatten
    }
}
