//! Shared store state: the layer registry, the published snapshot and the
//! serialised rebuild step.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tracing::{debug, warn};

use super::merge::{Merged, Origins, merge_layers};
use super::options::{Decoder, LayerOptions, MaskFn};
use super::sensitivity::sensitive_paths;
use crate::document::{Patch, PatchSet};
use crate::layer::{Layer, LayerName};
use crate::schema::PathTable;
use crate::{JubakoError, JubakoResult};

pub(super) type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(super) struct Entry {
    pub(super) layer: Arc<dyn Layer>,
    pub(super) name: LayerName,
    pub(super) options: LayerOptions,
    pub(super) data: Option<Value>,
    pub(super) patches: PatchSet,
    /// Tick of the load that produced `data`.
    pub(super) loaded_at: u64,
}

/// Registered layers, ordered by ascending `(priority, registration order)`.
#[derive(Default)]
pub(super) struct Registry {
    pub(super) entries: Vec<Entry>,
}

impl Registry {
    pub(super) fn insert(&mut self, layer: Arc<dyn Layer>, options: LayerOptions) -> JubakoResult<()> {
        let name = layer.name().clone();
        if self.find(name.as_str()).is_some() {
            return Err(Arc::new(JubakoError::DuplicateLayer {
                name: name.to_string(),
            }));
        }
        let pos = self
            .entries
            .partition_point(|entry| entry.options.priority() <= options.priority());
        self.entries.insert(
            pos,
            Entry {
                layer,
                name,
                options,
                data: None,
                patches: PatchSet::new(),
                loaded_at: 0,
            },
        );
        Ok(())
    }

    pub(super) fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.name == *name)
    }

    pub(super) fn find_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.name == *name)
    }

    pub(super) fn layers(&self) -> Vec<Arc<dyn Layer>> {
        self.entries.iter().map(|entry| Arc::clone(&entry.layer)).collect()
    }
}

/// A new tree for one layer.
pub(super) enum Change {
    /// Freshly loaded data; unsaved edits are re-applied on top.
    ///
    /// The tick comes from [`Inner::tick`] and must be taken before the
    /// layer is read. Data older than the layer's current tree is dropped.
    Loaded(LayerName, Value, u64),
    /// Data already carrying `patch`, which is recorded on success.
    Edited(LayerName, Value, Patch),
}

impl Change {
    fn name(&self) -> &LayerName {
        match self {
            Self::Loaded(name, ..) | Self::Edited(name, ..) => name,
        }
    }
}

struct Staged {
    idx: usize,
    tree: Value,
    patch: Option<Patch>,
    tick: Option<u64>,
}

/// Immutable view published after every successful rebuild.
pub(super) struct Snapshot<T> {
    pub(super) value: Arc<T>,
    pub(super) merged: Value,
    pub(super) origins: Origins,
}

pub(super) struct Inner<T> {
    pub(super) table: PathTable,
    pub(super) decoder: Decoder<T>,
    pub(super) mask: Option<MaskFn>,
    pub(super) strict_sensitivity: bool,
    pub(super) registry: Mutex<Registry>,
    pub(super) snapshot: ArcSwapOption<Snapshot<T>>,
    serial: ReentrantMutex<()>,
    subscribers: Mutex<Vec<(u64, Subscriber<T>)>>,
    next_subscriber: AtomicU64,
    ticks: AtomicU64,
}

impl<T: Send + Sync + 'static> Inner<T> {
    pub(super) fn new(
        table: PathTable,
        decoder: Decoder<T>,
        mask: Option<MaskFn>,
        strict_sensitivity: bool,
    ) -> Self {
        Self {
            table,
            decoder,
            mask,
            strict_sensitivity,
            registry: Mutex::new(Registry::default()),
            snapshot: ArcSwapOption::empty(),
            serial: ReentrantMutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
        }
    }

    /// Next load tick. Ticks increase strictly.
    pub(super) fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// Apply `changes`, rebuild and publish, then notify subscribers when
    /// the merged tree changed. Nothing is applied when any step fails.
    ///
    /// Rebuilds and notifications are serialised; a subscriber may call back
    /// into the store from its callback.
    pub(super) fn commit(&self, changes: Vec<Change>) -> JubakoResult<bool> {
        let _serial = self.serial.lock();
        let published = self.rebuild(changes)?;
        let changed = published.is_some();
        if let Some(value) = published {
            self.notify(&value);
        }
        Ok(changed)
    }

    fn rebuild(&self, changes: Vec<Change>) -> JubakoResult<Option<Arc<T>>> {
        let mut registry = self.registry.lock();
        let mut staged: Vec<Staged> = Vec::with_capacity(changes.len());
        for change in changes {
            let Some(idx) = registry
                .entries
                .iter()
                .position(|entry| entry.name == *change.name())
            else {
                debug!(layer = %change.name(), "dropping change for unregistered layer");
                continue;
            };
            let Some(entry) = registry.entries.get(idx) else {
                continue;
            };
            match change {
                Change::Loaded(_, mut tree, tick) => {
                    let newest = staged
                        .iter()
                        .filter(|item| item.idx == idx)
                        .filter_map(|item| item.tick)
                        .fold(entry.loaded_at, u64::max);
                    if tick < newest {
                        debug!(layer = %entry.name, tick, newest, "dropping stale layer data");
                        continue;
                    }
                    entry
                        .patches
                        .apply_to(&mut tree)
                        .map_err(|err| JubakoError::in_layer(entry.name.as_str(), err))?;
                    staged.push(Staged {
                        idx,
                        tree,
                        patch: None,
                        tick: Some(tick),
                    });
                }
                Change::Edited(_, tree, patch) => staged.push(Staged {
                    idx,
                    tree,
                    patch: Some(patch),
                    tick: None,
                }),
            }
        }

        let merged = {
            let layers = registry.entries.iter().enumerate().filter_map(|(idx, entry)| {
                staged
                    .iter()
                    .rev()
                    .find(|item| item.idx == idx)
                    .map(|item| &item.tree)
                    .or(entry.data.as_ref())
                    .map(|tree| (&entry.name, tree))
            });
            merge_layers(layers)
        };
        self.check_sensitivity(&registry, &staged)?;
        let value = (self.decoder)(self.table.to_decode_tree(&merged.tree))?;

        for item in staged {
            if let Some(entry) = registry.entries.get_mut(item.idx) {
                entry.data = Some(item.tree);
                if let Some(tick) = item.tick {
                    entry.loaded_at = tick;
                }
                if let Some(patch) = item.patch {
                    entry.patches.push(patch);
                }
            }
        }
        drop(registry);
        Ok(self.publish(value, merged))
    }

    fn check_sensitivity(&self, registry: &Registry, staged: &[Staged]) -> JubakoResult<()> {
        let mut violations = Vec::new();
        for item in staged {
            let Some(entry) = registry.entries.get(item.idx) else {
                continue;
            };
            if entry.options.is_sensitive() || item.patch.is_some() {
                continue;
            }
            for path in sensitive_paths(&self.table, &item.tree) {
                warn!(layer = %entry.name, path = %path, "sensitive field supplied by a normal layer");
                violations.push(Arc::new(JubakoError::SensitiveFieldInNormalLayer {
                    path,
                    layer: entry.name.to_string(),
                }));
            }
        }
        if self.strict_sensitivity
            && let Some(err) = JubakoError::try_aggregate(violations)
        {
            return Err(Arc::new(err));
        }
        Ok(())
    }

    fn publish(&self, value: T, merged: Merged) -> Option<Arc<T>> {
        let shared = Arc::new(value);
        let changed = self
            .snapshot
            .load()
            .as_ref()
            .is_none_or(|previous| previous.merged != merged.tree);
        self.snapshot.store(Some(Arc::new(Snapshot {
            value: Arc::clone(&shared),
            merged: merged.tree,
            origins: merged.origins,
        })));
        changed.then_some(shared)
    }

    fn notify(&self, value: &Arc<T>) {
        let subscribers: Vec<Subscriber<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        debug!(subscribers = subscribers.len(), "configuration changed");
        for callback in subscribers {
            callback(value);
        }
    }

    pub(super) fn subscribe(&self, callback: Subscriber<T>) -> u64 {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, callback));
        id
    }

    pub(super) fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|(sub, _)| *sub != id);
    }
}
