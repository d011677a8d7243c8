//! Core error types.
//!
//! The [`Store`](crate::Store) has no recoverable error path of its own:
//! misuse (duplicate insert through the private add path, decrementing a
//! zero refcount, removing an entry that was never added) is a programming
//! error and traps loudly via `panic!`/`debug_assert!` rather than returning
//! a `Result`, per the error taxonomy this subsystem follows. `CoreError` is
//! kept as an empty marker so downstream crates have a stable error type to
//! wrap should a recoverable Store-level error ever need to be introduced.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {}
