//! Layered configuration store with typed access, origin tracking and
//! format-preserving writes.
//!
//! Configuration is assembled from named [`layer::Layer`]s, each backed by
//! a [`source::Source`] and a [`document::Document`] format, an environment
//! snapshot or an in-memory map. A [`Store`] merges them by priority,
//! decodes the result into a typed struct and records which layer supplied
//! every path. Fields marked `#[jubako(sensitive)]` are only accepted from
//! sensitive layers and are masked on request.
//!
//! The [`Schema`] derive describes the configuration type to the store; it
//! honours `serde` renames and adds `#[jubako(...)]` field attributes for
//! sensitivity, path remapping and environment bindings.

extern crate self as jubako;

pub mod document;
mod error;
pub mod jsonptr;
pub mod layer;
mod result_ext;
pub mod schema;
pub mod source;
pub mod store;
pub mod watcher;

use std::sync::Arc;

pub use error::{AggregatedErrors, JubakoError};
pub use jubako_macros::Schema;
pub use result_ext::{JubakoDecodeExt, JubakoResultExt};
pub use schema::Schema;
pub use store::{Cell, LayerOptions, Store, StoreOptions, Unsubscribe, WatchConfig, WatchHandle};
pub use tokio_util::sync::CancellationToken;

/// Result alias used throughout the crate.
///
/// Errors are shared so that one failure can be logged, handed to a watch
/// error handler and returned to the caller.
pub type JubakoResult<T> = Result<T, Arc<JubakoError>>;
