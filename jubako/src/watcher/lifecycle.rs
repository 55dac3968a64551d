//! Start/stop state shared by every watcher kind.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{OpMutex, Results, WatchResult};
use crate::{JubakoError, JubakoResult};

enum State {
    Idle(mpsc::Sender<WatchResult>),
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopped,
}

pub(super) struct Lifecycle {
    state: Mutex<State>,
    results: Mutex<Option<Results>>,
}

impl Lifecycle {
    pub(super) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            state: Mutex::new(State::Idle(tx)),
            results: Mutex::new(Some(rx)),
        }
    }

    /// Spawn `run` unless already running.
    ///
    /// `prepare` runs first and may fail, in which case the watcher stays
    /// idle.
    pub(super) fn start<P, T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        prepare: P,
        run: F,
    ) -> JubakoResult<()>
    where
        P: FnOnce() -> JubakoResult<T>,
        F: FnOnce(T, mpsc::Sender<WatchResult>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        let tx = match &*state {
            State::Running { .. } => return Ok(()),
            State::Stopped => return Err(Arc::new(JubakoError::WatcherStopped)),
            State::Idle(tx) => tx.clone(),
        };
        let prepared = prepare()?;
        let cancel = ctx.child_token();
        let task = tokio::spawn(run(prepared, tx, cancel.clone()));
        *state = State::Running { cancel, task };
        Ok(())
    }

    pub(super) async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Stopped);
        if let State::Running { cancel, task } = previous {
            cancel.cancel();
            if let Err(err) = task.await {
                warn!(error = %err, "watcher task ended abnormally");
            }
        }
    }

    pub(super) fn take_results(&self) -> Option<Results> {
        self.results.lock().take()
    }
}

/// Send `result` unless the watcher is cancelled first.
///
/// Returns `false` when the watcher should exit.
pub(super) async fn emit(
    tx: &mpsc::Sender<WatchResult>,
    result: WatchResult,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        sent = tx.send(result) => sent.is_ok(),
        () = cancel.cancelled() => false,
    }
}

/// Acquire the operation mutex unless cancelled first.
pub(super) async fn lock_op<'a>(
    op_mu: &'a OpMutex,
    cancel: &CancellationToken,
) -> Option<tokio::sync::MutexGuard<'a, ()>> {
    tokio::select! {
        guard = op_mu.lock() => Some(guard),
        () = cancel.cancelled() => None,
    }
}
