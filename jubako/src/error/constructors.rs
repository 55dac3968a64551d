//! Constructors, aggregation and classification helpers for `JubakoError`.

use std::sync::Arc;

use super::{AggregatedErrors, JubakoError};
use crate::document::DocumentFormat;

impl JubakoError {
    /// Tries to build a [`JubakoError`] from an iterator of errors.
    ///
    /// Returns `None` for an empty iterator, the error itself for a single
    /// uniquely owned error, and [`Self::Aggregate`] otherwise.
    #[must_use]
    pub fn try_aggregate<I, E>(errors: I) -> Option<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<Arc<Self>>,
    {
        let mut arcs: Vec<Arc<Self>> = errors.into_iter().map(Into::into).collect();
        if arcs.is_empty() {
            return None;
        }
        Some(if arcs.len() == 1 {
            let last = arcs.pop()?;
            match Arc::try_unwrap(last) {
                Ok(err) => err,
                Err(shared) => Self::Aggregate(Box::new(AggregatedErrors::new(vec![shared]))),
            }
        } else {
            Self::Aggregate(Box::new(AggregatedErrors::new(arcs)))
        })
    }

    /// Build a [`JubakoError`] from at least one error.
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty. Use [`JubakoError::try_aggregate`] when
    /// the list may be empty.
    #[must_use]
    #[track_caller]
    pub fn aggregate<I, E>(errors: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Arc<Self>>,
    {
        Self::try_aggregate(errors).map_or_else(
            || panic!("aggregate requires at least one error"),
            |err| err,
        )
    }

    /// Construct a [`JubakoError::Source`] for `resource`.
    #[must_use]
    pub fn source(
        resource: impl Into<String>,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Arc<Self> {
        Arc::new(Self::Source {
            resource: resource.into(),
            source: err.into(),
        })
    }

    /// Construct a [`JubakoError::NotExist`] for `resource`.
    #[must_use]
    pub fn not_exist(resource: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::NotExist {
            resource: resource.into(),
        })
    }

    /// Construct a [`JubakoError::Parse`] for `format`.
    #[must_use]
    pub fn parse(
        format: DocumentFormat,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Arc<Self> {
        Arc::new(Self::Parse {
            format,
            source: err.into(),
        })
    }

    /// Construct a [`JubakoError::InvalidPath`].
    #[must_use]
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// Construct a [`JubakoError::Decode`].
    #[must_use]
    pub fn decode(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Arc<Self> {
        Arc::new(Self::Decode { source: err.into() })
    }

    /// Attach the layer name to `err`. Errors already tagged are kept as is.
    #[must_use]
    pub fn in_layer(layer: impl Into<String>, err: Arc<Self>) -> Arc<Self> {
        if matches!(err.as_ref(), Self::Layer { .. }) {
            return err;
        }
        Arc::new(Self::Layer {
            layer: layer.into(),
            source: err,
        })
    }

    /// Returns `true` when any contained error reports a missing resource.
    #[must_use]
    pub fn is_not_exist(&self) -> bool {
        self.any(|err| matches!(err, Self::NotExist { .. }))
    }

    /// Returns `true` when any contained error is a sensitivity violation.
    #[must_use]
    pub fn is_sensitive_violation(&self) -> bool {
        self.any(|err| {
            matches!(
                err,
                Self::SensitiveFieldToNormalLayer { .. } | Self::SensitiveFieldInNormalLayer { .. }
            )
        })
    }

    /// Returns `true` when any contained error reports cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.any(|err| matches!(err, Self::Cancelled))
    }

    /// Returns `true` when any contained error reports an external edit.
    #[must_use]
    pub fn is_source_modified(&self) -> bool {
        self.any(|err| matches!(err, Self::SourceModified { .. }))
    }

    fn any(&self, pred: impl Fn(&Self) -> bool + Copy) -> bool {
        match self {
            Self::Aggregate(errors) => errors.iter().any(|err| err.any(pred)),
            Self::Layer { source, .. } => source.any(pred),
            other => pred(other),
        }
    }
}
