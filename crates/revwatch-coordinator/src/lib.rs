//! The single-threaded coordinator that multiplexes a backing store's
//! change feed and observer subscribe/next/stop requests over a
//! [`revwatch_core::Store`].
//!
//! Nothing outside [`Coordinator::run`] ever touches the Store; observers
//! talk to it only through [`Observer`] handles minted from a
//! [`CoordinatorHandle`].

mod backing;
mod config;
mod coordinator;
mod error;
mod handle;
mod observer;
mod request;

pub use backing::Backing;
pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use handle::{CoordinatorHandle, ObserverId};
pub use observer::Observer;
