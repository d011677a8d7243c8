//! The thin client-facing stub.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::trace;

use revwatch_core::{Delta, EntityInfo, Revno};

use crate::error::CoordinatorError;
use crate::handle::ObserverId;
use crate::request::{CoordinatorRequest, NextOutcome};

/// A client-side handle that polls the Coordinator for deltas since its
/// last-seen revno.
///
/// Never touches the Store directly. Every call is a request/reply round
/// trip through the Coordinator's task; a handle whose Coordinator has
/// died will not block forever, since every wait also races the
/// Coordinator's terminal signal. Cheap to clone — clones share the same
/// underlying observer id and revno/stopped state, which is how a single
/// observer ends up with more than one outstanding `Next` at a time (the
/// Coordinator's waiting queue is explicitly built to serve several,
/// FIFO).
pub struct Observer<I: EntityInfo> {
    id: ObserverId,
    requests: mpsc::Sender<CoordinatorRequest<I>>,
    terminal: watch::Receiver<Option<Arc<CoordinatorError>>>,
    revno: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
}

impl<I: EntityInfo> Clone for Observer<I> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            requests: self.requests.clone(),
            terminal: self.terminal.clone(),
            revno: self.revno.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<I: EntityInfo> Observer<I> {
    pub(crate) fn new(
        id: ObserverId,
        requests: mpsc::Sender<CoordinatorRequest<I>>,
        terminal: watch::Receiver<Option<Arc<CoordinatorError>>>,
    ) -> Self {
        Self {
            id,
            requests,
            terminal,
            revno: Arc::new(AtomicU64::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The highest revno this observer has been told about.
    pub fn revno(&self) -> Revno {
        self.revno.load(Ordering::SeqCst)
    }

    /// Whether this handle has been stopped, locally or by the Coordinator.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Block until either new deltas arrive or the Coordinator terminates.
    pub async fn next(&self) -> Result<Vec<Delta<I>>, CoordinatorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CoordinatorError::WatcherStopped);
        }
        if let Some(cause) = self.terminal_cause() {
            return Err(CoordinatorError::Dead(cause));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .requests
            .send(CoordinatorRequest::Next {
                observer: self.id,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return Err(self.dead_or_stopped());
        }

        let mut terminal = self.terminal.clone();
        tokio::select! {
            outcome = reply_rx => match outcome {
                Ok(NextOutcome::Delivered { deltas, revno }) => {
                    self.revno.fetch_max(revno, Ordering::SeqCst);
                    trace!(observer = self.id.0, revno, count = deltas.len(), "delivered");
                    Ok(deltas)
                }
                Ok(NextOutcome::Stopped) => {
                    self.stopped.store(true, Ordering::SeqCst);
                    Err(CoordinatorError::WatcherStopped)
                }
                Ok(NextOutcome::Dead(cause)) => {
                    self.stopped.store(true, Ordering::SeqCst);
                    Err(CoordinatorError::Dead(cause))
                }
                Err(_) => Err(self.dead_or_stopped()),
            },
            _ = terminal.changed() => Err(self.dead_or_stopped()),
        }
    }

    /// Stop this observer. A no-op that still returns `Ok(())` if it was
    /// already stopped while the Coordinator is alive.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(cause) = self.terminal_cause() {
            return Err(CoordinatorError::Dead(cause));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .requests
            .send(CoordinatorRequest::Stop {
                observer: self.id,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return Err(self.dead_or_stopped());
        }
        let _ = reply_rx.await;
        Ok(())
    }

    fn terminal_cause(&self) -> Option<Arc<CoordinatorError>> {
        self.terminal.borrow().clone()
    }

    fn dead_or_stopped(&self) -> CoordinatorError {
        match self.terminal_cause() {
            Some(cause) => CoordinatorError::Dead(cause),
            None => CoordinatorError::WatcherStopped,
        }
    }
}
