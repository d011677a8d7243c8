//! Wire encoding for entity change deltas.
//!
//! Exposes the `[entityKind, operation, payload]` envelope shape from the
//! core's wire contract, with JSON and MessagePack encodings and a
//! kind-tag dispatch table for extending the set of entity kinds a process
//! can decode.

mod envelope;
mod error;

pub use envelope::{entity_id_hint, Envelope, KindRegistry, Operation};
pub use error::WireError;
