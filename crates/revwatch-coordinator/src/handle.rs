//! The observer factory bound to one running Coordinator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use revwatch_core::EntityInfo;

use crate::error::CoordinatorError;
use crate::observer::Observer;
use crate::request::CoordinatorRequest;

/// Identifies one Observer across its lifetime, for the Coordinator's
/// internal bookkeeping (`observers`, `waiting`). Never exposed for
/// equality against anything but itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// Cloneable handle for minting new [`Observer`]s against one running
/// Coordinator. Cheap to clone; holds no Store access of its own.
#[derive(Clone)]
pub struct CoordinatorHandle<I: EntityInfo> {
    pub(crate) requests: mpsc::Sender<CoordinatorRequest<I>>,
    pub(crate) terminal: watch::Receiver<Option<Arc<CoordinatorError>>>,
    pub(crate) next_id: Arc<AtomicU64>,
}

impl<I: EntityInfo> CoordinatorHandle<I> {
    /// Mint a new Observer at revno 0 ("tell me everything that currently
    /// exists").
    pub fn subscribe(&self) -> Observer<I> {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Observer::new(id, self.requests.clone(), self.terminal.clone())
    }
}
