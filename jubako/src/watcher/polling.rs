//! Interval-based watcher.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::lifecycle::{Lifecycle, emit, lock_op};
use super::{CompareFunc, FetchFn, OpMutex, Results, WatchResult, Watcher, WatcherParams, WatcherType};
use crate::JubakoResult;

/// Calls a fetch function at a fixed interval, starting immediately.
///
/// The first successful fetch is always emitted. Later fetches are emitted
/// when the source reports a change and the [`CompareFunc`] agrees. Fetch
/// errors are emitted and polling carries on at the same interval.
pub struct PollingWatcher {
    fetch: FetchFn,
    op_mu: OpMutex,
    interval: Duration,
    compare: CompareFunc,
    lifecycle: Lifecycle,
}

impl PollingWatcher {
    /// Build a polling watcher from factory parameters.
    #[must_use]
    pub fn new(params: WatcherParams) -> Self {
        let WatcherParams {
            fetch,
            op_mu,
            options,
        } = params;
        Self {
            fetch,
            op_mu,
            interval: options.poll_interval(),
            compare: options.compare(),
            lifecycle: Lifecycle::new(options.capacity()),
        }
    }

    /// Polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Watcher for PollingWatcher {
    fn kind(&self) -> WatcherType {
        WatcherType::Polling
    }

    fn start(&self, ctx: &CancellationToken) -> JubakoResult<()> {
        let fetch = self.fetch.clone();
        let op_mu = self.op_mu.clone();
        let compare = self.compare.clone();
        let interval = self.interval;
        self.lifecycle.start(
            ctx,
            || Ok(()),
            move |(), tx, cancel| poll_loop(fetch, op_mu, compare, interval, tx, cancel),
        )
    }

    async fn stop(&self) {
        self.lifecycle.stop().await;
    }

    fn take_results(&self) -> Option<Results> {
        self.lifecycle.take_results()
    }
}

async fn poll_loop(
    fetch: FetchFn,
    op_mu: OpMutex,
    compare: CompareFunc,
    interval: Duration,
    tx: mpsc::Sender<WatchResult>,
    cancel: CancellationToken,
) {
    let mut last: Option<Vec<u8>> = None;
    loop {
        let started = Instant::now();
        let outcome = {
            let Some(_guard) = lock_op(&op_mu, &cancel).await else {
                break;
            };
            fetch(cancel.clone()).await
        };
        let result = match outcome {
            Ok(fetched) => {
                let emit_now = last
                    .as_deref()
                    .is_none_or(|prev| fetched.changed && compare.changed(prev, &fetched.data));
                // Compare against the latest fetch, emitted or not.
                last = Some(fetched.data.clone());
                emit_now.then_some(Ok(fetched.data))
            }
            Err(err) if err.is_cancelled() && cancel.is_cancelled() => break,
            Err(err) => {
                warn!(error = %err, "poll failed");
                Some(Err(err))
            }
        };
        if let Some(result) = result {
            if !emit(&tx, result, &cancel).await {
                break;
            }
        }
        let wait = interval.saturating_sub(started.elapsed());
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }
    }
    debug!("polling watcher exited");
}
