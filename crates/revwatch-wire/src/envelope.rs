//! The `[entityKind, operation, payload]` delta envelope.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use tracing::trace;

use revwatch_core::{Delta, EntityId, EntityInfo};

use crate::error::WireError;

/// Which half of a [`Delta`] an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Change,
    Remove,
}

/// The wire form of one [`Delta`]: an ordered triple, never a JSON object.
///
/// `payload` is kept as an untyped [`serde_json::Value`] here because the
/// envelope itself does not know which Rust type `entityKind` decodes to —
/// that mapping lives in [`KindRegistry`]. Two entities of different kinds
/// can travel over the same channel this way.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: String,
    pub operation: Operation,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn change(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            operation: Operation::Change,
            payload,
        }
    }

    pub fn remove(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            operation: Operation::Remove,
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::encode)
    }

    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::decode_envelope)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::encode)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::decode_envelope)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.kind)?;
        tuple.serialize_element(&self.operation)?;
        tuple.serialize_element(&self.payload)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvelopeVisitor;

        impl<'de> Visitor<'de> for EnvelopeVisitor {
            type Value = Envelope;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 3-element [entityKind, operation, payload] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Envelope, A::Error> {
                let kind: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let operation: Operation = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let payload: serde_json::Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                if seq.next_element::<serde_json::Value>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(Envelope {
                    kind,
                    operation,
                    payload,
                })
            }
        }

        deserializer.deserialize_tuple(3, EnvelopeVisitor)
    }
}

/// The set of entity kinds a given process is prepared to decode, plus the
/// conversions needed to turn an [`Envelope`] into a typed
/// [`Delta`](revwatch_core::Delta).
///
/// Extending the wire protocol with a new entity kind means registering it
/// here; an envelope whose `kind` is absent is a hard decode error
/// (`WireError::UnknownKind`), per spec.
#[derive(Debug, Default)]
pub struct KindRegistry {
    known: HashSet<String>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>) -> &mut Self {
        self.known.insert(kind.into());
        self
    }

    pub fn is_known(&self, kind: &str) -> bool {
        self.known.contains(kind)
    }

    /// Decode an envelope into a [`Delta`], provided `I`'s own `entity_id()`
    /// reports the kind this registry has on file for it. Returns
    /// `UnknownKind` if the envelope's tag was never registered.
    pub fn decode<I>(&self, envelope: &Envelope) -> Result<Delta<I>, WireError>
    where
        I: EntityInfo + serde::de::DeserializeOwned,
    {
        if !self.is_known(&envelope.kind) {
            return Err(WireError::UnknownKind(envelope.kind.clone()));
        }
        let entity: I = serde_json::from_value(envelope.payload.clone()).map_err(WireError::decode)?;
        trace!(kind = %envelope.kind, operation = ?envelope.operation, "decoded envelope");
        Ok(Delta {
            removed: matches!(envelope.operation, Operation::Remove),
            entity,
        })
    }

    /// Encode a [`Delta`] into its wire envelope, tagging it with `kind`.
    pub fn encode<I>(&self, kind: &str, delta: &Delta<I>) -> Result<Envelope, WireError>
    where
        I: EntityInfo + Serialize,
    {
        if !self.is_known(kind) {
            return Err(WireError::UnknownKind(kind.to_string()));
        }
        let payload = serde_json::to_value(&delta.entity).map_err(WireError::encode)?;
        Ok(Envelope {
            kind: kind.to_string(),
            operation: if delta.removed {
                Operation::Remove
            } else {
                Operation::Change
            },
            payload,
        })
    }
}

/// Used by callers that need the `(kind, id)` pair without going through a
/// registered decoder — e.g. logging a rejected envelope.
pub fn entity_id_hint(envelope: &Envelope) -> Option<EntityId> {
    let id = envelope.payload.get("id")?.as_str()?;
    Some(EntityId::new(envelope.kind.clone(), id.to_string()))
}
