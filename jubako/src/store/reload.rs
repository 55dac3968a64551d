//! Live reload: fans in every layer watcher and re-merges on change.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{BoxStream, select_all};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Store;
use super::options::{ErrorHandler, WatchConfig};
use super::state::{Change, Inner};
use crate::layer::{LayerName, LayerWatcher};
use crate::schema::Schema;
use crate::{JubakoError, JubakoResult};

type Tagged = (LayerName, JubakoResult<Value>);

/// Running watch session returned by [`Store::watch`].
///
/// Dropping the handle cancels the session without waiting for the
/// background tasks; [`WatchHandle::stop`] waits for them.
pub struct WatchHandle {
    cancel: CancellationToken,
    watchers: Vec<Box<dyn LayerWatcher>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchHandle {
    /// Stop every layer watcher and the coordinator. Safe to call twice.
    pub async fn stop(&self) {
        self.cancel.cancel();
        for watcher in &self.watchers {
            watcher.stop().await;
        }
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            warn!(error = %err, "reload coordinator ended abnormally");
        }
    }

    /// Whether the session has not been stopped or cancelled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("watchers", &self.watchers.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<T> Store<T>
where
    T: Schema + DeserializeOwned + Send + Sync + 'static,
{
    /// Watch every registered layer and reload on change.
    ///
    /// Each change replaces the layer's data, re-applies unsaved edits,
    /// re-merges all layers and notifies subscribers when the merged tree
    /// changed. Errors are logged, passed to the configured handler and do
    /// not end the session. Layers registered afterwards are not watched.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates failures creating or starting a layer watcher; watchers
    /// already started are stopped first.
    pub async fn watch(&self, config: WatchConfig) -> JubakoResult<WatchHandle> {
        let cancel = CancellationToken::new();
        let layers = self.inner.registry.lock().layers();
        let mut watchers: Vec<Box<dyn LayerWatcher>> = Vec::with_capacity(layers.len());
        let mut streams: Vec<BoxStream<'static, Tagged>> = Vec::with_capacity(layers.len());
        let mut failure = None;
        for layer in &layers {
            let started = layer.watch(config.options.clone()).and_then(|watcher| {
                let results = watcher.take_results();
                watcher.start(&cancel)?;
                Ok((watcher, results))
            });
            match started {
                Ok((watcher, results)) => {
                    if let Some(results) = results {
                        let name = layer.name().clone();
                        streams.push(results.map(move |item| (name.clone(), item)).boxed());
                    }
                    debug!(layer = %layer.name(), kind = ?watcher.kind(), "watching layer");
                    watchers.push(watcher);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            cancel.cancel();
            for watcher in &watchers {
                watcher.stop().await;
            }
            return Err(err);
        }

        let task = tokio::spawn(coordinate(
            Arc::clone(&self.inner),
            streams,
            config.on_error,
            cancel.clone(),
        ));
        info!(layers = watchers.len(), "watching configuration");
        Ok(WatchHandle {
            cancel,
            watchers,
            task: Mutex::new(Some(task)),
        })
    }
}

async fn coordinate<T: Send + Sync + 'static>(
    inner: Arc<Inner<T>>,
    streams: Vec<BoxStream<'static, Tagged>>,
    on_error: Option<ErrorHandler>,
    cancel: CancellationToken,
) {
    let report = |err: Arc<JubakoError>| {
        warn!(error = %err, "configuration reload failed");
        if let Some(handler) = &on_error {
            handler(&err);
        }
    };
    let mut merged = select_all(streams);
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = merged.next() => next,
        };
        match next {
            None => break,
            Some((layer, Ok(tree))) => {
                let change = Change::Loaded(layer.clone(), tree, inner.tick());
                match inner.commit(vec![change]) {
                    Ok(true) => info!(layer = %layer, "configuration reloaded"),
                    Ok(false) => debug!(layer = %layer, "layer reloaded without effective change"),
                    Err(err) => report(JubakoError::in_layer(layer.as_str(), err)),
                }
            }
            Some((_, Err(err))) => report(err),
        }
    }
    debug!("reload coordinator stopped");
}
