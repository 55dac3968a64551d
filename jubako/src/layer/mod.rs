//! Layers: named providers of one configuration tree.
//!
//! [`SourceLayer`] couples a byte [`Source`](crate::source::Source) with a
//! [`Document`] format. [`MapLayer`] serves an in-memory tree and
//! [`EnvLayer`] collects environment variables.

mod env;
mod map;
mod source;

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::document::{Document, DocumentFormat, PatchSet};
use crate::watcher::{NoopWatcher, WatchOptions, Watcher, WatcherType};
use crate::{JubakoError, JubakoResult};

pub use env::EnvLayer;
pub use map::MapLayer;
pub use source::SourceLayer;

/// Unique name of a layer within a store.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LayerName(Arc<str>);

impl LayerName {
    /// Create a name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Borrow the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LayerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LayerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LayerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for LayerName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl PartialEq<str> for LayerName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for LayerName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// A named provider of one configuration tree.
#[async_trait]
pub trait Layer: fmt::Debug + Send + Sync {
    /// Name of the layer.
    fn name(&self) -> &LayerName;

    /// Short diagnostic description such as `file` or `env`.
    fn kind(&self) -> &'static str;

    /// Document format, if the layer is backed by one.
    fn format(&self) -> Option<DocumentFormat> {
        None
    }

    /// Load the current tree.
    ///
    /// The returned value is owned by the caller; later loads never observe
    /// changes made to it.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::Cancelled`] when `ctx` is cancelled and
    /// propagates source and parse failures tagged with the layer name.
    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Value>;

    /// Persist `patches`.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::SaveNotSupported`] for read-only layers.
    async fn save(&self, _ctx: &CancellationToken, _patches: &PatchSet) -> JubakoResult<()> {
        Err(Arc::new(JubakoError::SaveNotSupported {
            layer: self.name().to_string(),
        }))
    }

    /// Whether [`Layer::save`] is supported.
    fn can_save(&self) -> bool {
        false
    }

    /// Create a watcher reporting new trees for this layer.
    ///
    /// Layers that never change return a watcher that never emits.
    ///
    /// # Errors
    ///
    /// Propagates failures creating the underlying watcher.
    fn watch(&self, _options: WatchOptions) -> JubakoResult<Box<dyn LayerWatcher>> {
        Ok(Box::new(DecodingWatcher::noop(self.name().clone())))
    }
}

/// Stream of parsed trees or errors from a [`LayerWatcher`].
pub type LayerResults = BoxStream<'static, JubakoResult<Value>>;

/// Watcher producing parsed trees for one layer.
#[async_trait]
pub trait LayerWatcher: Send + Sync {
    /// Flavour of the underlying watcher.
    fn kind(&self) -> WatcherType;

    /// Start watching. See [`Watcher::start`].
    ///
    /// # Errors
    ///
    /// Propagates [`Watcher::start`] failures.
    fn start(&self, ctx: &CancellationToken) -> JubakoResult<()>;

    /// Stop watching. See [`Watcher::stop`].
    async fn stop(&self);

    /// Take the result stream. Returns `None` after the first call.
    fn take_results(&self) -> Option<LayerResults>;
}

/// Parses the raw bytes of a [`Watcher`] with a [`Document`].
pub struct DecodingWatcher {
    layer: LayerName,
    inner: Box<dyn Watcher>,
    document: Arc<dyn Document>,
}

impl DecodingWatcher {
    /// Wrap `inner`, decoding its results with `document`.
    #[must_use]
    pub fn new(layer: LayerName, inner: Box<dyn Watcher>, document: Arc<dyn Document>) -> Self {
        Self {
            layer,
            inner,
            document,
        }
    }

    /// A watcher that never emits.
    #[must_use]
    pub fn noop(layer: LayerName) -> Self {
        Self::new(
            layer,
            Box::new(NoopWatcher::new()),
            Arc::new(crate::document::JsonDocument),
        )
    }
}

#[async_trait]
impl LayerWatcher for DecodingWatcher {
    fn kind(&self) -> WatcherType {
        self.inner.kind()
    }

    fn start(&self, ctx: &CancellationToken) -> JubakoResult<()> {
        self.inner
            .start(ctx)
            .map_err(|err| JubakoError::in_layer(self.layer.as_str(), err))
    }

    async fn stop(&self) {
        self.inner.stop().await;
    }

    fn take_results(&self) -> Option<LayerResults> {
        let receiver = self.inner.take_results()?;
        let document = Arc::clone(&self.document);
        let layer = self.layer.clone();
        let raw = stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Some(
            raw.map(move |item| {
                item.and_then(|bytes| document.parse(&bytes))
                    .map_err(|err| JubakoError::in_layer(layer.as_str(), err))
            })
            .boxed(),
        )
    }
}
