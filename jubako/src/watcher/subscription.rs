//! Event-driven watcher.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::lifecycle::{Lifecycle, emit, lock_op};
use super::{FetchFn, OpMutex, Results, WatchResult, Watcher, WatcherParams, WatcherType};
use crate::{JubakoError, JubakoResult};

/// Callback invoked by a [`SubscriptionHandler`].
///
/// - `(Some(data), None)` pushes new bytes.
/// - `(None, Some(err))` reports an error.
/// - `(None, None)` signals that something happened; the watcher fetches
///   the bytes itself and emits only when the fetch reports a change.
///
/// Safe to call from any thread.
pub type NotifyFn = Arc<dyn Fn(Option<Vec<u8>>, Option<Arc<JubakoError>>) + Send + Sync>;

/// Keeps an event subscription alive; dropping it unsubscribes.
pub struct Subscription {
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    /// Wrap whatever keeps the subscription alive.
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}

/// Source of change events.
pub trait SubscriptionHandler: Send + Sync {
    /// Begin delivering events to `notify`.
    ///
    /// # Errors
    ///
    /// Returns an error when the event source cannot be registered.
    fn subscribe(&self, notify: NotifyFn) -> JubakoResult<Subscription>;
}

/// Bridges a [`SubscriptionHandler`] onto the watcher protocol.
pub struct SubscriptionWatcher {
    handler: Arc<dyn SubscriptionHandler>,
    fetch: FetchFn,
    op_mu: OpMutex,
    lifecycle: Lifecycle,
}

impl SubscriptionWatcher {
    /// Build a watcher delivering events from `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn SubscriptionHandler>, params: WatcherParams) -> Self {
        Self {
            handler,
            fetch: params.fetch,
            op_mu: params.op_mu,
            lifecycle: Lifecycle::new(params.options.capacity()),
        }
    }
}

type Notification = (Option<Vec<u8>>, Option<Arc<JubakoError>>);

#[async_trait]
impl Watcher for SubscriptionWatcher {
    fn kind(&self) -> WatcherType {
        WatcherType::Subscription
    }

    fn start(&self, ctx: &CancellationToken) -> JubakoResult<()> {
        let handler = Arc::clone(&self.handler);
        let fetch = self.fetch.clone();
        let op_mu = self.op_mu.clone();
        self.lifecycle.start(
            ctx,
            move || {
                let (notify_tx, notify_rx) = mpsc::unbounded_channel::<Notification>();
                let notify: NotifyFn = Arc::new(move |data, err| {
                    if notify_tx.send((data, err)).is_err() {
                        debug!("dropping notification for stopped watcher");
                    }
                });
                let subscription = handler.subscribe(notify)?;
                Ok((subscription, notify_rx))
            },
            move |(subscription, notify_rx), tx, cancel| {
                event_loop(subscription, notify_rx, fetch, op_mu, tx, cancel)
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

async fn event_loop(
    subscription: Subscription,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    fetch: FetchFn,
    op_mu: OpMutex,
    tx: mpsc::Sender<WatchResult>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            next = notifications.recv() => next,
            () = cancel.cancelled() => break,
        };
        let Some(notification) = next else {
            break;
        };
        let result = match notification {
            (_, Some(err)) => {
                warn!(error = %err, "watch subscription reported an error");
                Some(Err(err))
            }
            (Some(data), None) => Some(Ok(data)),
            (None, None) => {
                let Some(_guard) = lock_op(&op_mu, &cancel).await else {
                    break;
                };
                match fetch(cancel.clone()).await {
                    Ok(fetched) if fetched.changed => Some(Ok(fetched.data)),
                    Ok(_) => None,
                    Err(err) if err.is_cancelled() && cancel.is_cancelled() => break,
                    Err(err) => Some(Err(err)),
                }
            }
        };
        if let Some(result) = result {
            if !emit(&tx, result, &cancel).await {
                break;
            }
        }
    }
    drop(subscription);
    debug!("subscription watcher exited");
}
