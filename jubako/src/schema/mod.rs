//! Schema descriptions and the path table derived from them.
//!
//! Configuration types describe their structure once through [`Schema`],
//! normally via `#[derive(Schema)]`. [`PathTable::build`] flattens that
//! description into a lookup table keyed by JSON Pointer paths so the store
//! never reflects over values at runtime.
//!
//! ```rust
//! use jubako::Schema;
//! use jubako::schema::PathTable;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Schema)]
//! struct Credentials {
//!     #[jubako(sensitive)]
//!     api_key: String,
//! }
//!
//! #[derive(Deserialize, Schema)]
//! struct AppConfig {
//!     credentials: Credentials,
//! }
//!
//! let table = PathTable::build::<AppConfig>();
//! assert!(table.is_sensitive("/credentials/api_key"));
//! ```

mod remap;
mod shape;
mod table;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

pub use shape::{FieldShape, ObjectShape, Shape, ShapeFn, ValueKind};
pub use table::{EntryKind, FieldEntry, PathTable};

/// Types that can describe their configuration structure.
///
/// Implemented for common leaf types, standard collections and wrappers.
/// Structs derive it with `#[derive(Schema)]`; foreign leaf types can be
/// registered with [`impl_leaf_schema!`](crate::impl_leaf_schema).
pub trait Schema {
    /// Describe the type.
    fn shape() -> Shape;
}

/// Implement [`Schema`] for types that are stored as a single value.
///
/// ```rust
/// struct Millis(u64);
/// jubako::impl_leaf_schema!(Millis => Integer);
/// ```
#[macro_export]
macro_rules! impl_leaf_schema {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl $crate::schema::Schema for $ty {
                fn shape() -> $crate::schema::Shape {
                    $crate::schema::Shape::Leaf($crate::schema::ValueKind::$kind)
                }
            }
        )+
    };
}

crate::impl_leaf_schema!(
    bool => Bool,
    i8 => Integer, i16 => Integer, i32 => Integer, i64 => Integer, i128 => Integer,
    isize => Integer,
    u8 => Integer, u16 => Integer, u32 => Integer, u64 => Integer, u128 => Integer,
    usize => Integer,
    f32 => Float, f64 => Float,
    char => String,
    String => String,
    std::path::PathBuf => String,
    camino::Utf8PathBuf => String,
    std::net::IpAddr => String,
    std::net::SocketAddr => String,
    std::time::Duration => Any,
    serde_json::Value => Any,
);

impl<T: Schema> Schema for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Schema> Schema for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Schema> Schema for Arc<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Schema> Schema for Vec<T> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Schema> Schema for VecDeque<T> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Schema, const N: usize> Schema for [T; N] {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Schema, S> Schema for HashMap<String, T, S> {
    fn shape() -> Shape {
        Shape::Map(T::shape)
    }
}

impl<T: Schema> Schema for BTreeMap<String, T> {
    fn shape() -> Shape {
        Shape::Map(T::shape)
    }
}
