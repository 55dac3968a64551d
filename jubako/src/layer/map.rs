//! In-memory layer.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::{Layer, LayerName};
use crate::JubakoResult;
use crate::document::PatchSet;
use crate::source::ensure_active;

/// Layer serving a tree held in memory.
///
/// Every load returns a deep copy, so edits to a loaded tree never leak back
/// into the layer. Saves apply patches to the held tree.
#[derive(Debug)]
pub struct MapLayer {
    name: LayerName,
    data: Mutex<Value>,
}

impl MapLayer {
    /// Create a layer holding `data`. `null` is treated as an empty object.
    pub fn new(name: impl Into<LayerName>, data: Value) -> Self {
        let tree = if data.is_null() {
            Value::Object(Map::new())
        } else {
            data
        };
        Self {
            name: name.into(),
            data: Mutex::new(tree),
        }
    }

    /// Create an empty layer.
    pub fn empty(name: impl Into<LayerName>) -> Self {
        Self::new(name, Value::Null)
    }

    /// Copy of the held tree.
    #[must_use]
    pub fn data(&self) -> Value {
        self.data.lock().clone()
    }

    /// Replace the held tree. Watchers do not observe the change; the next
    /// [`Layer::load`] does.
    pub fn replace(&self, data: Value) {
        *self.data.lock() = data;
    }
}

#[async_trait]
impl Layer for MapLayer {
    fn name(&self) -> &LayerName {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "map"
    }

    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Value> {
        ensure_active(ctx)?;
        Ok(self.data.lock().clone())
    }

    async fn save(&self, ctx: &CancellationToken, patches: &PatchSet) -> JubakoResult<()> {
        ensure_active(ctx)?;
        let mut data = self.data.lock();
        let mut next = data.clone();
        patches.apply_to(&mut next)?;
        *data = next;
        Ok(())
    }

    fn can_save(&self) -> bool {
        true
    }
}

