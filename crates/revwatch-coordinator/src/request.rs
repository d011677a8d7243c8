//! Messages exchanged between an [`Observer`](crate::Observer) and the
//! Coordinator's task.

use tokio::sync::oneshot;

use revwatch_core::{Delta, EntityInfo, Revno};
use std::sync::Arc;

use crate::error::CoordinatorError;
use crate::handle::ObserverId;

pub(crate) enum CoordinatorRequest<I: EntityInfo> {
    Next {
        observer: ObserverId,
        reply: oneshot::Sender<NextOutcome<I>>,
    },
    Stop {
        observer: ObserverId,
        reply: oneshot::Sender<()>,
    },
}

pub(crate) enum NextOutcome<I: EntityInfo> {
    Delivered { deltas: Vec<Delta<I>>, revno: Revno },
    Stopped,
    Dead(Arc<CoordinatorError>),
}
