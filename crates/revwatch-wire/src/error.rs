//! Wire-level error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    /// Decoded envelope did not carry a registered `entityKind` tag.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    /// Decoded value was not the required `[entityKind, operation, payload]` triple.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Failed to produce the wire form.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Failed to decode a wire form into an envelope.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Substring unique to the arity-rejection message `Envelope`'s
/// `Deserialize` impl raises via `de::Error::invalid_length`. Used to tell a
/// malformed-shape rejection apart from a generic decode failure without
/// giving the envelope's `Deserialize` impl its own `WireError`-typed return
/// (serde's `Deserialize::deserialize` must return `D::Error`, not ours).
const ARITY_MARKER: &str = "3-element [entityKind, operation, payload] array";

impl WireError {
    pub(crate) fn encode(err: impl std::fmt::Display) -> Self {
        WireError::Encode(err.to_string())
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        WireError::Decode(err.to_string())
    }

    /// Like [`Self::decode`], but for the envelope's outer shape: a
    /// wrong-length `[entityKind, operation, payload]` array is reported as
    /// [`WireError::MalformedEnvelope`] rather than the generic
    /// [`WireError::Decode`].
    pub(crate) fn decode_envelope(err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains(ARITY_MARKER) {
            WireError::MalformedEnvelope(msg)
        } else {
            WireError::Decode(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_message() {
        let err = WireError::UnknownKind("widget".to_string());
        assert!(err.to_string().contains("widget"));
    }

    #[test]
    fn decode_envelope_classifies_arity_rejection() {
        let err = WireError::decode_envelope(format!("invalid length 2, expected {ARITY_MARKER}"));
        assert!(matches!(err, WireError::MalformedEnvelope(_)));

        let err = WireError::decode_envelope("unexpected end of input");
        assert!(matches!(err, WireError::Decode(_)));
    }
}
