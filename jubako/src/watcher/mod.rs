//! Change detection for configuration sources.
//!
//! Every watcher kind exposes the same surface: [`Watcher::start`] spawns a
//! background task, results arrive on the channel returned by
//! [`Watcher::take_results`], and [`Watcher::stop`] tears the task down and
//! closes that channel. Fetches always run while holding the owning layer's
//! [`OpMutex`], so a poll never overlaps an explicit load or save.

mod lifecycle;
mod noop;
mod options;
mod polling;
mod subscription;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::JubakoResult;

pub use noop::NoopWatcher;
pub use options::{CompareFunc, DEFAULT_POLL_INTERVAL, WatchOptions};
pub use polling::PollingWatcher;
pub use subscription::{NotifyFn, Subscription, SubscriptionHandler, SubscriptionWatcher};

/// Mutex serialising every I/O operation on one layer.
pub type OpMutex = Arc<tokio::sync::Mutex<()>>;

/// Raw bytes or an error, as delivered by a watcher.
pub type WatchResult = JubakoResult<Vec<u8>>;

/// Receiving half of a watcher's result channel.
pub type Results = mpsc::Receiver<WatchResult>;

/// Outcome of one fetch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fetched {
    /// Whether the source considers the data different from the last fetch.
    pub changed: bool,
    /// Current bytes.
    pub data: Vec<u8>,
}

/// Reads the current bytes of a source. Called with the [`OpMutex`] held.
pub type FetchFn = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, JubakoResult<Fetched>> + Send + Sync>;

/// Watcher flavour.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatcherType {
    /// Periodic fetches.
    Polling,
    /// Event notifications from the source.
    Subscription,
    /// Never emits.
    Noop,
}

impl fmt::Display for WatcherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Polling => "polling",
            Self::Subscription => "subscription",
            Self::Noop => "noop",
        })
    }
}

/// A background task reporting changes to a source.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Flavour of this watcher.
    fn kind(&self) -> WatcherType;

    /// Spawn the background task. Calling `start` on a running watcher is a
    /// no-op. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`crate::JubakoError::WatcherStopped`] after [`Watcher::stop`]
    /// and propagates subscription failures.
    fn start(&self, ctx: &CancellationToken) -> JubakoResult<()>;

    /// Stop the task. Safe before `start` and when called repeatedly. Once
    /// this returns the result channel is closed and nothing more is sent.
    async fn stop(&self);

    /// Take the result channel. Returns `None` after the first call.
    fn take_results(&self) -> Option<Results>;
}

/// Inputs handed to a source's watcher factory.
#[derive(Clone)]
pub struct WatcherParams {
    /// Fetches the current bytes.
    pub fetch: FetchFn,
    /// The owning layer's operation mutex.
    pub op_mu: OpMutex,
    /// Per-layer watch settings.
    pub options: WatchOptions,
}

impl fmt::Debug for WatcherParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherParams")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Factory returned by [`crate::source::Source::watch`].
pub type WatcherInitializer = Box<dyn FnOnce(WatcherParams) -> JubakoResult<Box<dyn Watcher>> + Send>;
