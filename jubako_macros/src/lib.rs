//! Procedural macros for `jubako`.
//!
//! `#[derive(Schema)]` describes a configuration type to the store: the
//! serde key of every field, where the value lives in layer data, which
//! fields are sensitive and which environment variables feed them. The
//! description is produced once and indexed by `jubako::schema::PathTable`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod crate_path;
mod expand;
mod parse;

/// Derive `jubako::Schema` for a configuration struct or enum.
///
/// Field keys follow `#[serde(rename)]` and `#[serde(rename_all)]`;
/// `#[serde(skip)]` fields are omitted and `#[serde(flatten)]` fields are
/// inlined. Additional field directives:
///
/// - `#[jubako(sensitive)]` only accepts the value from sensitive layers
///   and masks it on request.
/// - `#[jubako(path = "/a/b")]` reads the value from another place in layer
///   data; relative paths such as `a/b` or `./a/b` start at the enclosing
///   struct.
/// - `#[jubako(env = "VAR")]` binds an environment variable for
///   `EnvLayer::with_schema`.
/// - `#[jubako(skip)]` leaves the field out of the schema.
///
/// `#[jubako(crate = "path")]` on the container points generated code at a
/// renamed dependency. Enums are described as single values.
#[proc_macro_derive(Schema, attributes(jubako))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
