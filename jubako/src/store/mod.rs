//! The layered store: registration, loading, merging and typed reads.
//!
//! A [`Store`] merges every registered layer in ascending priority order,
//! decodes the merged tree into `T` and publishes the result as one
//! immutable snapshot. Readers never observe a partial merge.
//!
//! # Examples
//!
//! ```rust
//! use jubako::layer::MapLayer;
//! use jubako::store::{LayerOptions, Store};
//! use serde::Deserialize;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Deserialize, jubako::Schema)]
//! struct Server {
//!     host: String,
//!     port: u16,
//! }
//!
//! #[derive(Debug, Deserialize, jubako::Schema)]
//! struct AppConfig {
//!     server: Server,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = Store::<AppConfig>::new();
//! store.add(
//!     MapLayer::new("defaults", json!({"server": {"host": "localhost", "port": 8080}})),
//!     LayerOptions::new(),
//! )?;
//! store.add(
//!     MapLayer::new("user", json!({"server": {"port": 9090}})),
//!     LayerOptions::new().with_priority(10),
//! )?;
//! store.load(&CancellationToken::new()).await?;
//!
//! let config = store.get().expect("loaded");
//! assert_eq!(config.server.host, "localhost");
//! assert_eq!(config.server.port, 9090);
//! assert_eq!(store.get_at("/server/port").layer_name(), Some("user"));
//! # Ok::<_, std::sync::Arc<jubako::JubakoError>>(())
//! # }).unwrap();
//! ```

mod cell;
mod merge;
mod options;
mod reload;
mod sensitivity;
mod state;
mod write;

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::layer::Layer;
use crate::schema::{PathTable, Schema};
use crate::source::ensure_active;
use crate::{JubakoDecodeExt, JubakoError, JubakoResult};

pub use cell::{Cell, LayerInfo, WalkContext};
pub use options::{Decoder, ErrorHandler, LayerOptions, MaskFn, Priority, StoreOptions, WatchConfig};
pub use reload::WatchHandle;

use state::{Change, Inner};

/// Layered configuration store for the typed configuration `T`.
///
/// Cloning a store yields another handle to the same state.
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        let names: Vec<&str> = registry.entries.iter().map(|e| e.name.as_str()).collect();
        f.debug_struct("Store")
            .field("layers", &names)
            .field("loaded", &self.inner.snapshot.load().is_some())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// Dropping the handle keeps the subscription; call
/// [`Unsubscribe::unsubscribe`] to remove it.
#[must_use = "dropping the handle makes the subscription permanent"]
pub struct Unsubscribe {
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Unsubscribe {
    /// Remove the subscription.
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

impl<T> Default for Store<T>
where
    T: Schema + DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Store<T>
where
    T: Schema + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a store with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Create a store with `options`.
    #[must_use]
    pub fn with_options(options: StoreOptions<T>) -> Self {
        Self {
            inner: Arc::new(Inner::new(
                PathTable::build::<T>(),
                options.decoder.unwrap_or_else(serde_decoder::<T>),
                options.mask,
                options.strict_sensitivity,
            )),
        }
    }

    /// Register `layer`. It joins the merge on the next [`Store::load`].
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::DuplicateLayer`] when the name is taken.
    pub fn add(&self, layer: impl Layer + 'static, options: LayerOptions) -> JubakoResult<()> {
        self.add_shared(Arc::new(layer), options)
    }

    /// Register a shared layer handle. See [`Store::add`].
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::DuplicateLayer`] when the name is taken.
    pub fn add_shared(&self, layer: Arc<dyn Layer>, options: LayerOptions) -> JubakoResult<()> {
        let name = layer.name().clone();
        self.inner.registry.lock().insert(layer, options)?;
        info!(layer = %name, priority = %options.priority(), "registered layer");
        Ok(())
    }

    /// Load every layer concurrently, then merge, decode and publish.
    ///
    /// Unsaved edits made with [`Store::set_to`] are re-applied on top of the
    /// freshly loaded data.
    ///
    /// # Errors
    ///
    /// Fails when any layer fails to load (all failures are aggregated), when
    /// the merged tree does not decode into `T`, or, with strict sensitivity,
    /// when a normal layer supplies a sensitive field. The previously
    /// published snapshot is kept on failure.
    pub async fn load(&self, ctx: &CancellationToken) -> JubakoResult<()> {
        ensure_active(ctx)?;
        let layers = self.inner.registry.lock().layers();
        let tick = self.inner.tick();
        let results = join_all(layers.iter().map(|layer| layer.load(ctx))).await;
        let mut changes = Vec::with_capacity(layers.len());
        let mut errors = Vec::new();
        for (layer, result) in layers.iter().zip(results) {
            match result {
                Ok(tree) => changes.push(Change::Loaded(layer.name().clone(), tree, tick)),
                Err(err) => errors.push(err),
            }
        }
        if let Some(err) = JubakoError::try_aggregate(errors) {
            return Err(Arc::new(err));
        }
        let changed = self.inner.commit(changes)?;
        info!(layers = layers.len(), changed, "configuration loaded");
        Ok(())
    }

    /// Current typed configuration, or `None` before the first successful
    /// load.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.inner
            .snapshot
            .load()
            .as_ref()
            .map(|snapshot| Arc::clone(&snapshot.value))
    }

    /// Copy of the current merged tree, or `None` before the first
    /// successful load.
    #[must_use]
    pub fn merged(&self) -> Option<Value> {
        self.inner
            .snapshot
            .load()
            .as_ref()
            .map(|snapshot| snapshot.merged.clone())
    }

    /// Value at `path` with its origin, masked when the path or one of its
    /// descendants is sensitive and a mask is configured.
    #[must_use]
    pub fn get_at(&self, path: &str) -> Cell {
        self.cell(path, true)
    }

    /// Like [`Store::get_at`] but never masks.
    #[must_use]
    pub fn get_at_unmasked(&self, path: &str) -> Cell {
        self.cell(path, false)
    }

    fn cell(&self, path: &str, masking: bool) -> Cell {
        let table = &self.inner.table;
        let sensitive = table.is_sensitive(path);
        let guard = self.inner.snapshot.load();
        let Some(snapshot) = guard.as_ref() else {
            return Cell::missing(sensitive);
        };
        let Some(found) = snapshot.merged.pointer(path) else {
            return Cell::missing(sensitive);
        };
        let mut value = found.clone();
        let mut masked = false;
        if let Some(mask) = self.inner.mask.as_ref().filter(|_| masking) {
            if sensitive {
                value = mask(path, &value);
                masked = true;
            } else {
                masked = sensitivity::mask_descendants(table, path, &mut value, mask.as_ref());
            }
        }
        Cell {
            value,
            exists: true,
            layer: snapshot.origins.lookup(path).cloned(),
            sensitive,
            masked,
        }
    }

    /// Visit the merged tree depth first, starting at the root. Returning
    /// `false` from `visitor` skips the node's children.
    ///
    /// Values are passed unmasked; use [`WalkContext::sensitive`] to decide
    /// what to reveal.
    pub fn walk(&self, mut visitor: impl FnMut(&WalkContext<'_>) -> bool) {
        let guard = self.inner.snapshot.load();
        let Some(snapshot) = guard.as_ref() else {
            return;
        };
        let table = &self.inner.table;
        let mut path = String::new();
        cell::walk(&snapshot.merged, &mut path, &mut |at: &str, value: &Value| {
            visitor(&WalkContext {
                path: at,
                value,
                sensitive: table.is_sensitive(at),
                layer: snapshot.origins.lookup(at),
            })
        });
    }

    /// Registered layers in merge order, lowest priority first.
    #[must_use]
    pub fn list_layers(&self) -> Vec<LayerInfo> {
        self.inner
            .registry
            .lock()
            .entries
            .iter()
            .map(|entry| LayerInfo {
                name: entry.name.clone(),
                priority: entry.options.priority(),
                sensitive: entry.options.is_sensitive(),
                kind: entry.layer.kind(),
                format: entry.layer.format(),
                can_save: entry.layer.can_save(),
                loaded: entry.data.is_some(),
                dirty: !entry.patches.is_empty(),
            })
            .collect()
    }

    /// Schema index derived from `T`.
    #[must_use]
    pub fn table(&self) -> &PathTable {
        &self.inner.table
    }

    /// Human-readable dump of the schema index.
    #[must_use]
    pub fn mapping_table(&self) -> String {
        self.inner.table.to_string()
    }

    /// Call `callback` with the new configuration after every change of
    /// the merged tree.
    ///
    /// Callbacks run on the task that triggered the change, one change at a
    /// time, and may call back into the store.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.inner.subscribe(Arc::new(callback));
        let weak = Arc::downgrade(&self.inner);
        Unsubscribe {
            remove: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.unsubscribe(id);
                }
            }),
        }
    }
}

fn serde_decoder<T: DeserializeOwned>() -> Decoder<T> {
    Arc::new(|value: Value| serde_json::from_value(value).into_jubako_decode())
}

#[cfg(test)]
mod tests;
