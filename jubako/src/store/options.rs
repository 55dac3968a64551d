//! Store, layer and watch configuration.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::watcher::WatchOptions;
use crate::{JubakoError, JubakoResult};

/// Decodes the merged tree into the typed configuration.
pub type Decoder<T> = Arc<dyn Fn(Value) -> JubakoResult<T> + Send + Sync>;

/// Produces the masked representation of a sensitive value at a path.
pub type MaskFn = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// Receives errors reported while watching.
pub type ErrorHandler = Arc<dyn Fn(&Arc<JubakoError>) + Send + Sync>;

/// Merge priority of a layer. Higher priorities win.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Priority(pub i64);

impl Priority {
    /// Priority used when none is configured.
    pub const DEFAULT: Self = Self(0);
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registration settings for one layer.
///
/// # Examples
///
/// ```rust
/// use jubako::store::{LayerOptions, Priority};
///
/// let opts = LayerOptions::new().with_priority(10).sensitive();
/// assert_eq!(opts.priority(), Priority(10));
/// assert!(opts.is_sensitive());
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LayerOptions {
    priority: Priority,
    sensitive: bool,
}

impl LayerOptions {
    /// Default priority, not sensitive.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            priority: Priority::DEFAULT,
            sensitive: false,
        }
    }

    /// Set the merge priority.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Allow the layer to hold sensitive fields.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Merge priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether the layer may hold sensitive fields.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.sensitive
    }
}

/// Behaviour of a [`crate::store::Store`].
pub struct StoreOptions<T> {
    pub(super) mask: Option<MaskFn>,
    pub(super) strict_sensitivity: bool,
    pub(super) decoder: Option<Decoder<T>>,
}

impl<T> Default for StoreOptions<T> {
    fn default() -> Self {
        Self {
            mask: None,
            strict_sensitivity: false,
            decoder: None,
        }
    }
}

impl<T> fmt::Debug for StoreOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("mask", &self.mask.is_some())
            .field("strict_sensitivity", &self.strict_sensitivity)
            .field("custom_decoder", &self.decoder.is_some())
            .finish()
    }
}

impl<T> StoreOptions<T> {
    /// Default options: no mask, lenient sensitivity checks, serde decoding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask sensitive values returned by [`crate::store::Store::get_at`].
    #[must_use]
    pub fn with_mask(mut self, mask: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.mask = Some(Arc::new(mask));
        self
    }

    /// Mask every sensitive value with the same replacement.
    #[must_use]
    pub fn with_mask_value(self, replacement: impl Into<Value>) -> Self {
        let masked: Value = replacement.into();
        self.with_mask(move |_, _| masked.clone())
    }

    /// Fail loads when a sensitive field is supplied by a normal layer
    /// instead of logging a warning.
    #[must_use]
    pub const fn strict_sensitivity(mut self, strict: bool) -> Self {
        self.strict_sensitivity = strict;
        self
    }

    /// Replace the default `serde_json::from_value` decoding.
    #[must_use]
    pub fn with_decoder(
        mut self,
        decoder: impl Fn(Value) -> JubakoResult<T> + Send + Sync + 'static,
    ) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }
}

/// Settings for [`crate::store::Store::watch`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use jubako::store::WatchConfig;
/// use jubako::watcher::WatchOptions;
///
/// let config = WatchConfig::new()
///     .with_options(WatchOptions::default().with_poll_interval(Duration::from_secs(5)))
///     .on_error(|err| tracing::error!(%err, "reload failed"));
/// let _ = config;
/// ```
#[derive(Clone, Default)]
pub struct WatchConfig {
    pub(super) options: WatchOptions,
    pub(super) on_error: Option<ErrorHandler>,
}

impl WatchConfig {
    /// Default watch options and no error handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options passed to every layer watcher.
    #[must_use]
    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Call `handler` for every watch or reload error. Errors are logged
    /// either way.
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&Arc<JubakoError>) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchConfig")
            .field("options", &self.options)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
