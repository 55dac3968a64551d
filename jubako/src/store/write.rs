//! Write path: edit one layer in memory, then persist its patches.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Store;
use super::state::Change;
use crate::document::{Patch, PatchOp, PatchSet};
use crate::layer::Layer;
use crate::schema::Schema;
use crate::source::ensure_active;
use crate::{JubakoError, JubakoResult, jsonptr};

impl<T> Store<T>
where
    T: Schema + DeserializeOwned + Send + Sync + 'static,
{
    /// Set `value` at `path` in the layer named `layer` and re-materialise.
    ///
    /// The edit is kept in memory and recorded as a patch until
    /// [`Store::save`] persists it. Non-sensitive fields may be written to
    /// sensitive layers.
    ///
    /// # Errors
    ///
    /// - [`JubakoError::UnknownLayer`] when no layer has that name.
    /// - [`JubakoError::LayerNotLoaded`] before the layer's first load.
    /// - [`JubakoError::SaveNotSupported`] for read-only layers.
    /// - [`JubakoError::SensitiveFieldToNormalLayer`] when `path` is
    ///   sensitive and the layer is not.
    /// - [`JubakoError::InvalidPath`] for malformed or root paths.
    /// - [`JubakoError::Decode`] when the edited tree no longer decodes;
    ///   the edit is discarded.
    pub fn set_to(&self, layer: &str, path: &str, value: Value) -> JubakoResult<()> {
        let change = {
            let registry = self.inner.registry.lock();
            let entry = registry.find(layer).ok_or_else(|| {
                Arc::new(JubakoError::UnknownLayer {
                    name: layer.to_owned(),
                })
            })?;
            let Some(data) = entry.data.as_ref() else {
                return Err(Arc::new(JubakoError::LayerNotLoaded {
                    name: layer.to_owned(),
                }));
            };
            if !entry.layer.can_save() {
                return Err(Arc::new(JubakoError::SaveNotSupported {
                    layer: layer.to_owned(),
                }));
            }
            if self.inner.table.is_sensitive(path) && !entry.options.is_sensitive() {
                return Err(Arc::new(JubakoError::SensitiveFieldToNormalLayer {
                    path: path.to_owned(),
                    layer: layer.to_owned(),
                }));
            }
            let op = if jsonptr::get(data, path).is_some() {
                PatchOp::Replace
            } else {
                PatchOp::Add
            };
            let mut tree = data.clone();
            jsonptr::set(&mut tree, path, value.clone())?;
            Change::Edited(
                entry.name.clone(),
                tree,
                Patch {
                    op,
                    path: path.to_owned(),
                    value: Some(value),
                },
            )
        };
        self.inner.commit(vec![change])?;
        debug!(layer, path, "value set");
        Ok(())
    }

    /// Whether any layer has unsaved edits.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner
            .registry
            .lock()
            .entries
            .iter()
            .any(|entry| !entry.patches.is_empty())
    }

    /// Persist the edits of every dirty layer.
    ///
    /// Every dirty layer is attempted; edits are cleared only for layers
    /// that saved successfully.
    ///
    /// # Errors
    ///
    /// Aggregates the errors of every layer that failed to save, for
    /// example [`JubakoError::SourceModified`] after an external edit.
    pub async fn save(&self, ctx: &CancellationToken) -> JubakoResult<()> {
        ensure_active(ctx)?;
        let dirty = self.pending(None);
        let mut errors = Vec::new();
        for (layer, patches) in dirty {
            if let Err(err) = self.persist(ctx, &layer, &patches).await {
                errors.push(err);
            }
        }
        JubakoError::try_aggregate(errors).map_or(Ok(()), |err| Err(Arc::new(err)))
    }

    /// Persist the edits of the layer named `name`. Clean layers are a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::UnknownLayer`] for unknown names and
    /// propagates the layer's save failure.
    pub async fn save_layer(&self, ctx: &CancellationToken, name: &str) -> JubakoResult<()> {
        ensure_active(ctx)?;
        if self.inner.registry.lock().find(name).is_none() {
            return Err(Arc::new(JubakoError::UnknownLayer {
                name: name.to_owned(),
            }));
        }
        for (layer, patches) in self.pending(Some(name)) {
            self.persist(ctx, &layer, &patches).await?;
        }
        Ok(())
    }

    fn pending(&self, only: Option<&str>) -> Vec<(Arc<dyn Layer>, PatchSet)> {
        self.inner
            .registry
            .lock()
            .entries
            .iter()
            .filter(|entry| !entry.patches.is_empty())
            .filter(|entry| only.is_none_or(|name| entry.name == *name))
            .map(|entry| (Arc::clone(&entry.layer), entry.patches.clone()))
            .collect()
    }

    async fn persist(
        &self,
        ctx: &CancellationToken,
        layer: &Arc<dyn Layer>,
        patches: &PatchSet,
    ) -> JubakoResult<()> {
        layer
            .save(ctx, patches)
            .await
            .map_err(|err| JubakoError::in_layer(layer.name().as_str(), err))?;
        if let Some(entry) = self.inner.registry.lock().find_mut(layer.name().as_str()) {
            entry.patches.discard_first(patches.len());
        }
        info!(layer = %layer.name(), patches = patches.len(), "saved layer");
        Ok(())
    }
}
