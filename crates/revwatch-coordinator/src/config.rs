//! Coordinator construction parameters.

/// Tunables for a [`Coordinator`](crate::Coordinator) instance.
///
/// No on-disk format backs this: the Coordinator has no persisted state and
/// no CLI/environment surface of its own, so callers construct this
/// directly.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Capacity of the channel Backing delivers change events on.
    pub change_channel_capacity: usize,
    /// Capacity of the channel observer handles submit requests on.
    pub request_channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            change_channel_capacity: 1024,
            request_channel_capacity: 1024,
        }
    }
}
