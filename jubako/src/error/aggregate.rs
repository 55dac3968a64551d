//! Failures collected from one store operation.

use std::{error::Error, fmt, sync::Arc};

use super::JubakoError;

/// Every failure raised by a single [`Store::load`](crate::Store::load) or
/// [`Store::save`](crate::Store::save).
///
/// Layers are loaded and saved independently, so one call can fail for
/// several layers at once. Each entry keeps the layer it came from.
///
/// # Examples
///
/// ```
/// use jubako::JubakoError;
///
/// let err = JubakoError::aggregate(vec![
///     JubakoError::in_layer("user", JubakoError::not_exist("user.toml")),
///     JubakoError::in_layer("secrets", JubakoError::not_exist("secrets.json")),
/// ]);
/// if let JubakoError::Aggregate(failures) = err {
///     assert_eq!(failures.layers().collect::<Vec<_>>(), ["user", "secrets"]);
///     assert!(failures.iter().all(JubakoError::is_not_exist));
/// }
/// ```
#[derive(Debug, Default)]
pub struct AggregatedErrors {
    failures: Vec<Arc<JubakoError>>,
}

impl AggregatedErrors {
    /// Collect `failures` in the order they were reported.
    #[must_use]
    pub const fn new(failures: Vec<Arc<JubakoError>>) -> Self {
        Self { failures }
    }

    /// Each failure, in report order.
    #[must_use = "iterators should be consumed to inspect errors"]
    pub fn iter(&self) -> impl Iterator<Item = &JubakoError> {
        self.failures.iter().map(Arc::as_ref)
    }

    /// Names of the layers that failed, for failures tagged with one.
    #[must_use = "iterators should be consumed to inspect errors"]
    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.iter().filter_map(|failure| match failure {
            JubakoError::Layer { layer, .. } => Some(layer.as_str()),
            _ => None,
        })
    }

    /// How many failures were collected.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether nothing failed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregatedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = self.failures.iter();
        if let Some(first) = lines.next() {
            write!(f, "  - {first}")?;
        }
        for failure in lines {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl Error for AggregatedErrors {}

impl IntoIterator for AggregatedErrors {
    type Item = Arc<JubakoError>;
    type IntoIter = std::vec::IntoIter<Arc<JubakoError>>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}
