//! Coordinator-facing error taxonomy.

use std::sync::Arc;

use thiserror::Error;

/// Errors observable by a client of the Coordinator.
///
/// `Dead` and `Transient` carry `Arc`-wrapped causes so the same terminal
/// error can be cloned out to every pending reply and every future caller
/// without re-running the failure.
#[derive(Debug, Error, Clone)]
pub enum CoordinatorError {
    /// `Backing::get_all` or `Backing::changed` failed. Currently always
    /// fatal to the Coordinator (see the design notes on this policy).
    #[error("backing store error: {0}")]
    Transient(Arc<anyhow::Error>),

    /// The Coordinator was asked to shut down gracefully.
    #[error("coordinator shut down")]
    Shutdown,

    /// `Next` was called on an observer that has been, or is being,
    /// stopped.
    #[error("watcher stopped")]
    WatcherStopped,

    /// Any call made after the Coordinator has already terminated.
    #[error("coordinator terminated: {0}")]
    Dead(Arc<CoordinatorError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_display_includes_cause() {
        let cause = Arc::new(CoordinatorError::Shutdown);
        let err = CoordinatorError::Dead(cause);
        assert!(err.to_string().contains("shut down"));
    }
}
