//! Watcher for sources that never change.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::lifecycle::Lifecycle;
use super::{Results, Watcher, WatcherType};
use crate::JubakoResult;

/// Never emits. The result channel closes on stop or cancellation.
pub struct NoopWatcher {
    lifecycle: Lifecycle,
}

impl NoopWatcher {
    /// Create a watcher with an empty result channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(1),
        }
    }
}

impl Default for NoopWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Watcher for NoopWatcher {
    fn kind(&self) -> WatcherType {
        WatcherType::Noop
    }

    fn start(&self, ctx: &CancellationToken) -> JubakoResult<()> {
        self.lifecycle.start(
            ctx,
            || Ok(()),
            |(), tx, cancel| async move {
                cancel.cancelled().await;
                drop(tx);
            },
        )
    }

    async fn stop(&self) {
        self.lifecycle.stop().await;
    }

    fn take_results(&self) -> Option<Results> {
        self.lifecycle.take_results()
    }
}
