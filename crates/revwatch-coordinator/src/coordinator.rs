//! The single task that owns the Store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use revwatch_core::{EntityId, EntityInfo, Revno, Store};

use crate::backing::Backing;
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::handle::{CoordinatorHandle, ObserverId};
use crate::request::{CoordinatorRequest, NextOutcome};

struct ObserverState {
    revno: Revno,
    stopped: bool,
}

struct PendingNext<I: EntityInfo> {
    reply: tokio::sync::oneshot::Sender<NextOutcome<I>>,
}

/// Owns the [`Store`], the per-observer waiting queues, and the Backing
/// subscription. Exactly one task ever runs [`Coordinator::run`]; nothing
/// else reads or writes the Store.
pub struct Coordinator<I, B>
where
    I: EntityInfo,
    B: Backing<I>,
{
    store: Store<I>,
    backing: B,
    observers: HashMap<ObserverId, ObserverState>,
    waiting: HashMap<ObserverId, VecDeque<PendingNext<I>>>,
    change_tx: mpsc::Sender<B::Change>,
    change_rx: mpsc::Receiver<B::Change>,
    change_stream_open: bool,
    request_rx: mpsc::Receiver<CoordinatorRequest<I>>,
    requests_open: bool,
    terminal_tx: watch::Sender<Option<Arc<CoordinatorError>>>,
}

impl<I, B> Coordinator<I, B>
where
    I: EntityInfo,
    B: Backing<I>,
{
    /// Build a Coordinator plus the handle used to mint Observers for it.
    /// The Coordinator itself does not start serving until [`Self::run`]
    /// is awaited (typically on a dedicated `tokio::spawn`ed task).
    pub fn new(backing: B, config: CoordinatorConfig) -> (Self, CoordinatorHandle<I>) {
        let (change_tx, change_rx) = mpsc::channel(config.change_channel_capacity);
        let (request_tx, request_rx) = mpsc::channel(config.request_channel_capacity);
        let (terminal_tx, terminal_rx) = watch::channel(None);

        let coordinator = Self {
            store: Store::new(),
            backing,
            observers: HashMap::new(),
            waiting: HashMap::new(),
            change_tx,
            change_rx,
            change_stream_open: true,
            request_rx,
            requests_open: true,
            terminal_tx,
        };
        let handle = CoordinatorHandle {
            requests: request_tx,
            terminal: terminal_rx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (coordinator, handle)
    }

    /// Load the initial snapshot and enter the service loop. Returns once
    /// shutdown is signalled (`Ok`) or the Backing reports a fatal error
    /// (`Err`, also broadcast to every Observer as a terminal cause).
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), CoordinatorError> {
        self.backing.watch(self.change_tx.clone()).await;

        info!("loading initial snapshot from backing");
        if let Err(err) = self.backing.get_all(&mut self.store).await {
            return self.die(anyhow::Error::new(err)).await;
        }
        info!(entities = self.store.len(), "initial snapshot loaded, entering service loop");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("shutdown signalled");
                    self.graceful_shutdown().await;
                    return Ok(());
                }

                change = self.change_rx.recv(), if self.change_stream_open => {
                    match change {
                        Some(change) => {
                            if let Err(err) = self.backing.changed(&mut self.store, change).await {
                                warn!(error = %err, "backing reported a fatal error");
                                return self.die(anyhow::Error::new(err)).await;
                            }
                            self.respond_pass();
                        }
                        None => {
                            warn!("backing change stream closed unexpectedly");
                            self.change_stream_open = false;
                            return self
                                .die(anyhow::anyhow!("backing change stream closed"))
                                .await;
                        }
                    }
                }

                request = self.request_rx.recv(), if self.requests_open => {
                    match request {
                        Some(request) => {
                            self.handle_request(request);
                            self.respond_pass();
                        }
                        None => {
                            debug!("last observer handle dropped, no more requests possible");
                            self.requests_open = false;
                        }
                    }
                }
            }
        }
    }

    fn handle_request(&mut self, request: CoordinatorRequest<I>) {
        match request {
            CoordinatorRequest::Next { observer, reply } => {
                let state = self
                    .observers
                    .entry(observer)
                    .or_insert_with(|| ObserverState { revno: 0, stopped: false });
                if state.stopped {
                    let _ = reply.send(NextOutcome::Stopped);
                    return;
                }
                self.waiting
                    .entry(observer)
                    .or_default()
                    .push_back(PendingNext { reply });
            }
            CoordinatorRequest::Stop { observer, reply } => {
                match self.observers.get_mut(&observer) {
                    Some(state) if !state.stopped => {
                        state.stopped = true;
                        if let Some(pending) = self.waiting.remove(&observer) {
                            for p in pending {
                                let _ = p.reply.send(NextOutcome::Stopped);
                            }
                        }
                        self.leave(observer);
                    }
                    Some(_) => {}
                    None => {
                        self.observers
                            .insert(observer, ObserverState { revno: 0, stopped: true });
                    }
                }
                let _ = reply.send(());
            }
        }
    }

    /// For every observer with a pending request, deliver the next batch
    /// of deltas it hasn't seen, advance its revno, and run the refcount
    /// accounting that delivery implies.
    fn respond_pass(&mut self) {
        let observer_ids: Vec<ObserverId> = self.waiting.keys().copied().collect();
        for observer in observer_ids {
            let Some(state) = self.observers.get(&observer) else {
                continue;
            };
            let since = state.revno;
            let deltas = self.store.changes_since(since);
            if deltas.is_empty() {
                continue;
            }

            let Some(queue) = self.waiting.get_mut(&observer) else {
                continue;
            };
            let Some(pending) = queue.pop_front() else {
                continue;
            };
            if queue.is_empty() {
                self.waiting.remove(&observer);
            }

            let new_revno = self.store.latest_revno();
            let _ = pending.reply.send(NextOutcome::Delivered {
                deltas,
                revno: new_revno,
            });

            self.seen(since);
            if let Some(state) = self.observers.get_mut(&observer) {
                state.revno = new_revno;
            }
        }
    }

    /// Refcount accounting after a delivery that moved some observer from
    /// revno `since` to `latestRevno`.
    fn seen(&mut self, since: Revno) {
        for id in self.store.changed_since(since) {
            let Some(entry) = self.store.entry(&id) else {
                continue;
            };
            if !entry.removed && entry.creation_revno > since {
                self.store.inc_ref(&id);
            } else if entry.removed && entry.creation_revno <= since {
                self.store.dec_ref(&id);
            }
        }
    }

    /// Refcount accounting when an observer departs (Stop or Coordinator
    /// death): release interest in everything it was ever told about,
    /// except entities it already received the removal delta for.
    fn leave(&mut self, observer: ObserverId) {
        let Some(state) = self.observers.get(&observer) else {
            return;
        };
        let revno = state.revno;
        let ids: Vec<EntityId> = self.store.order_ids().cloned().collect();
        for id in ids {
            let Some(entry) = self.store.entry(&id) else {
                continue;
            };
            let ever_seen_alive = entry.creation_revno <= revno;
            let already_notified_removed = entry.removed && entry.revno <= revno;
            if ever_seen_alive && !already_notified_removed {
                self.store.dec_ref(&id);
            }
        }
    }

    async fn graceful_shutdown(&mut self) {
        let _ = self.terminal_tx.send(Some(Arc::new(CoordinatorError::Shutdown)));
        for (_, queue) in self.waiting.drain() {
            for pending in queue {
                let _ = pending.reply.send(NextOutcome::Stopped);
            }
        }
        self.backing.unwatch(&self.change_tx).await;
    }

    async fn die(mut self, cause: anyhow::Error) -> Result<(), CoordinatorError> {
        let cause = Arc::new(CoordinatorError::Transient(Arc::new(cause)));
        error!(cause = %cause, "coordinator terminating");
        let _ = self.terminal_tx.send(Some(cause.clone()));
        for (_, queue) in self.waiting.drain() {
            for pending in queue {
                let _ = pending.reply.send(NextOutcome::Dead(cause.clone()));
            }
        }
        self.backing.unwatch(&self.change_tx).await;
        Err((*cause).clone())
    }
}
