//! The external collaborator the Coordinator consumes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use revwatch_core::{EntityInfo, Store};

/// What the Coordinator needs from an authoritative backing store: an
/// initial snapshot and a live change feed.
///
/// Implementations translate their own database events into
/// [`Store::update`]/[`Store::remove`] calls inside `get_all`/`changed`; the
/// change object itself is opaque to everything above this trait.
#[async_trait]
pub trait Backing<I: EntityInfo>: Send + Sync + 'static {
    /// One change event as delivered on the watch channel.
    type Change: Send + 'static;
    /// Failure from either `get_all` or `changed`. Always fatal to the
    /// Coordinator — see the design notes on this policy.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Populate `store` with the full current snapshot. Called exactly
    /// once, before the service loop starts.
    async fn get_all(&self, store: &mut Store<I>) -> Result<(), Self::Error>;

    /// Apply one change event to `store`.
    async fn changed(&self, store: &mut Store<I>, change: Self::Change) -> Result<(), Self::Error>;

    /// Start delivering change events on `sink`.
    async fn watch(&self, sink: mpsc::Sender<Self::Change>);

    /// Stop delivering change events. Called on Coordinator exit,
    /// including after a fatal error.
    async fn unwatch(&self, sink: &mpsc::Sender<Self::Change>);
}
