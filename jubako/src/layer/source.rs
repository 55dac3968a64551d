//! Layer backed by a byte source and a document format.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{DecodingWatcher, Layer, LayerName, LayerWatcher};
use crate::document::{self, Document, DocumentFormat, PatchSet};
use crate::source::{self as sources, FileSource, Fingerprint, Source, ensure_active, fingerprint};
use crate::watcher::{FetchFn, Fetched, NoopWatcher, OpMutex, WatchOptions, Watcher, WatcherParams};
use crate::{JubakoError, JubakoResult};

/// Couples a [`Source`] with a [`Document`].
///
/// Loads, saves and watcher fetches on one layer are serialised by a shared
/// operation mutex.
///
/// # Examples
///
/// ```rust
/// use jubako::document::JsonDocument;
/// use jubako::layer::{Layer, SourceLayer};
/// use jubako::source::BytesSource;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let layer = SourceLayer::new(
///     "inline",
///     BytesSource::new("inline", r#"{"server": {"port": 8080}}"#),
///     JsonDocument,
/// );
/// let tree = layer.load(&CancellationToken::new()).await?;
/// assert_eq!(tree["server"]["port"], 8080);
/// # Ok::<_, std::sync::Arc<jubako::JubakoError>>(())
/// # }).unwrap();
/// ```
pub struct SourceLayer {
    name: LayerName,
    source: Arc<dyn Source>,
    document: Arc<dyn Document>,
    op_mu: OpMutex,
    last: Arc<Mutex<Option<Fingerprint>>>,
}

impl SourceLayer {
    /// Create a layer named `name`.
    pub fn new(
        name: impl Into<LayerName>,
        source: impl Source + 'static,
        document: impl Document + 'static,
    ) -> Self {
        Self::shared(name, Arc::new(source), Arc::new(document))
    }

    /// Create a layer from shared handles, so callers can keep a reference
    /// to the source.
    pub fn shared(
        name: impl Into<LayerName>,
        source: Arc<dyn Source>,
        document: Arc<dyn Document>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            document,
            op_mu: OpMutex::default(),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a file layer, picking the format from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::InvalidPath`] when the extension has no
    /// enabled format.
    pub fn file(name: impl Into<LayerName>, path: impl Into<Utf8PathBuf>) -> JubakoResult<Self> {
        let file: Utf8PathBuf = path.into();
        let document = file
            .extension()
            .and_then(document::for_extension)
            .ok_or_else(|| JubakoError::invalid_path(file.as_str(), "unsupported file extension"))?;
        Ok(Self::shared(name, Arc::new(FileSource::new(file)), document))
    }

    /// The operation mutex shared with this layer's watchers.
    #[must_use]
    pub fn op_mutex(&self) -> OpMutex {
        Arc::clone(&self.op_mu)
    }

    fn tag(&self, err: Arc<JubakoError>) -> Arc<JubakoError> {
        JubakoError::in_layer(self.name.as_str(), err)
    }

    fn fetch_fn(&self) -> FetchFn {
        let source = Arc::clone(&self.source);
        let last = Arc::clone(&self.last);
        Arc::new(move |ctx: CancellationToken| {
            let fetch_source = Arc::clone(&source);
            let fetch_last = Arc::clone(&last);
            async move {
                let data = fetch_source.load(&ctx).await?;
                let current = fingerprint(&data);
                let changed = fetch_last.lock().replace(current) != Some(current);
                Ok(Fetched { changed, data })
            }
            .boxed()
        })
    }
}

impl fmt::Debug for SourceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLayer")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Layer for SourceLayer {
    fn name(&self) -> &LayerName {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.source.kind()
    }

    fn format(&self) -> Option<DocumentFormat> {
        Some(self.document.format())
    }

    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Value> {
        ensure_active(ctx)?;
        let _guard = self.op_mu.lock().await;
        let bytes = self.source.load(ctx).await.map_err(|err| self.tag(err))?;
        let tree = self.document.parse(&bytes).map_err(|err| self.tag(err))?;
        *self.last.lock() = Some(fingerprint(&bytes));
        debug!(layer = %self.name, source = %self.source.resource(), "loaded layer");
        Ok(tree)
    }

    async fn save(&self, ctx: &CancellationToken, patches: &PatchSet) -> JubakoResult<()> {
        if !self.source.can_save() {
            return Err(Arc::new(JubakoError::SaveNotSupported {
                layer: self.name.to_string(),
            }));
        }
        ensure_active(ctx)?;
        let _guard = self.op_mu.lock().await;
        let written = Mutex::new(None);
        let document = Arc::clone(&self.document);
        let update: sources::UpdateFn<'_> = Box::new(|current: &[u8]| {
            let next = document.apply(current, patches)?;
            *written.lock() = Some(fingerprint(&next));
            Ok(next)
        });
        self.source
            .save(ctx, update)
            .await
            .map_err(|err| self.tag(err))?;
        if let Some(saved) = written.into_inner() {
            *self.last.lock() = Some(saved);
        }
        debug!(layer = %self.name, patches = patches.len(), "saved layer");
        Ok(())
    }

    fn can_save(&self) -> bool {
        self.source.can_save()
    }

    fn watch(&self, options: WatchOptions) -> JubakoResult<Box<dyn LayerWatcher>> {
        let inner: Box<dyn Watcher> = match self.source.watch() {
            Some(init) => init(WatcherParams {
                fetch: self.fetch_fn(),
                op_mu: self.op_mutex(),
                options,
            })
            .map_err(|err| self.tag(err))?,
            None => Box::new(NoopWatcher::new()),
        };
        Ok(Box::new(DecodingWatcher::new(
            self.name.clone(),
            inner,
            Arc::clone(&self.document),
        )))
    }
}
