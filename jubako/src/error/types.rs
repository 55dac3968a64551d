//! Primary error enum for layered configuration flows.

use figment::Error as FigmentError;
use thiserror::Error;

use super::aggregate::AggregatedErrors;
use crate::document::DocumentFormat;

/// Errors produced while loading, merging, watching or saving layers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JubakoError {
    /// I/O failure reported by a source.
    #[error("source error in '{resource}': {source}")]
    Source {
        /// Identity of the resource (file path, buffer name, layer name).
        resource: String,
        /// Underlying error reported by the source.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The resource backing a source does not exist.
    #[error("resource '{resource}' does not exist")]
    NotExist {
        /// Identity of the missing resource.
        resource: String,
    },

    /// A document could not be parsed or serialised.
    #[error("{format} document error: {source}")]
    Parse {
        /// Format of the document that failed.
        format: DocumentFormat,
        /// Underlying parser or serialiser error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error while gathering values from environment providers.
    #[error("failed to gather configuration: {0}")]
    Gathering(#[from] Box<FigmentError>),

    /// The merged tree could not be decoded into the typed configuration.
    #[error("failed to decode merged configuration: {source}")]
    Decode {
        /// Underlying deserialisation error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A JSON Pointer path is malformed or cannot be applied.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// A sensitive field was written to a layer not marked sensitive.
    #[error("sensitive field '{path}' cannot be written to normal layer '{layer}'")]
    SensitiveFieldToNormalLayer {
        /// Path of the sensitive field.
        path: String,
        /// Target layer.
        layer: String,
    },

    /// A sensitive field was supplied by a layer not marked sensitive.
    #[error("sensitive field '{path}' is provided by normal layer '{layer}'")]
    SensitiveFieldInNormalLayer {
        /// Path of the sensitive field.
        path: String,
        /// Layer that supplied the value.
        layer: String,
    },

    /// The layer or its source is read-only.
    #[error("layer '{layer}' does not support saving")]
    SaveNotSupported {
        /// Layer that rejected the save.
        layer: String,
    },

    /// The underlying bytes changed since the last load.
    #[error("source '{resource}' was modified externally since it was last loaded")]
    SourceModified {
        /// Identity of the conflicting resource.
        resource: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// A layer with the same name is already registered.
    #[error("layer '{name}' is already registered")]
    DuplicateLayer {
        /// Duplicate layer name.
        name: String,
    },

    /// No layer with the given name is registered.
    #[error("unknown layer '{name}'")]
    UnknownLayer {
        /// Requested layer name.
        name: String,
    },

    /// The layer has not been loaded yet.
    #[error("layer '{name}' has not been loaded")]
    LayerNotLoaded {
        /// Layer name.
        name: String,
    },

    /// The watcher was stopped and cannot be restarted.
    #[error("watcher has been stopped")]
    WatcherStopped,

    /// An error raised while operating on a specific layer.
    #[error("layer '{layer}': {source}")]
    Layer {
        /// Name of the layer.
        layer: String,
        /// Underlying error.
        #[source]
        source: std::sync::Arc<JubakoError>,
    },

    /// Multiple errors occurred during a single operation.
    #[error("multiple configuration errors:\n{0}")]
    Aggregate(Box<AggregatedErrors>),
}
