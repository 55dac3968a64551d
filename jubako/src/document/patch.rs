//! Path-addressed edits recorded against a layer.

use serde_json::Value;

use crate::{JubakoResult, jsonptr};

/// Kind of edit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchOp {
    /// Create a value that did not exist.
    Add,
    /// Overwrite an existing value.
    Replace,
    /// Delete a value.
    Remove,
}

/// One edit.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    /// Kind of edit.
    pub op: PatchOp,
    /// JSON Pointer of the edited value.
    pub path: String,
    /// New value; `None` for removals.
    pub value: Option<Value>,
}

/// Ordered list of edits.
///
/// # Examples
///
/// ```rust
/// use jubako::document::PatchSet;
/// use serde_json::json;
///
/// let mut patches = PatchSet::new();
/// patches.replace("/server/port", json!(9090));
/// patches.remove("/server/debug");
///
/// let mut tree = json!({"server": {"port": 8080, "debug": true}});
/// patches.apply_to(&mut tree)?;
/// assert_eq!(tree, json!({"server": {"port": 9090}}));
/// # Ok::<_, std::sync::Arc<jubako::JubakoError>>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchSet {
    patches: Vec<Patch>,
}

impl PatchSet {
    /// Create an empty patch set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            patches: Vec::new(),
        }
    }

    /// Append a patch.
    pub fn push(&mut self, patch: Patch) {
        self.patches.push(patch);
    }

    /// Record an [`PatchOp::Add`].
    pub fn add(&mut self, path: impl Into<String>, value: Value) {
        self.push(Patch {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        });
    }

    /// Record a [`PatchOp::Replace`].
    pub fn replace(&mut self, path: impl Into<String>, value: Value) {
        self.push(Patch {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        });
    }

    /// Record a [`PatchOp::Remove`].
    pub fn remove(&mut self, path: impl Into<String>) {
        self.push(Patch {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        });
    }

    /// Number of recorded patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns `true` when no patch is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Iterate over the patches in recording order.
    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.patches.iter()
    }

    /// Forget every patch.
    pub fn clear(&mut self) {
        self.patches.clear();
    }

    /// Drop the oldest `count` patches, keeping any recorded after them.
    pub(crate) fn discard_first(&mut self, count: usize) {
        self.patches.drain(..count.min(self.patches.len()));
    }

    /// Apply every patch to `tree` in order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::JubakoError::InvalidPath`] when a patch path is
    /// malformed or addresses the root.
    pub fn apply_to(&self, tree: &mut Value) -> JubakoResult<()> {
        for patch in &self.patches {
            match (&patch.op, &patch.value) {
                (PatchOp::Add | PatchOp::Replace, Some(value)) => {
                    jsonptr::set(tree, &patch.path, value.clone())?;
                }
                _ => {
                    jsonptr::delete(tree, &patch.path)?;
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.iter()
    }
}
