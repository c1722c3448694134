//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" converts between Rust types and wire text. The rest of the
//! stack doesn't care HOW messages are serialized — it just needs
//! something implementing the [`Codec`] trait, so the format can be
//! swapped without touching gateway or client code.
//!
//! The wire format is JSON text frames (one message per frame), so the
//! codec works in `String`/`&str` rather than raw bytes. [`JsonCodec`] is
//! the provided implementation, behind the `json` feature (on by default).

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to wire text and decode text back.
///
/// Bounds: `Send + Sync + 'static` because the codec is shared across the
/// per-connection tasks Tokio may run on any thread, and it must not
/// borrow temporary data.
///
/// The methods are generic: `encode` accepts any `T: Serialize`, `decode`
/// produces any `T: DeserializeOwned`. `DeserializeOwned` (rather than
/// plain `Deserialize`) means the result owns all its data, so the input
/// frame can be dropped immediately after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one wire frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes one wire frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or does
    /// not match the expected message shape.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps the wire human-readable: frames show up legibly in browser
/// DevTools and in logs, and the original web clients speak it natively.
///
/// ## Example
///
/// ```rust
/// use convoy_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
///
/// let text = codec.encode(&ClientMessage::GetUsers).unwrap();
/// assert_eq!(text, r#"{"type":"get_users"}"#);
///
/// let decoded: ClientMessage = codec.decode(&text).unwrap();
/// assert_eq!(decoded, ClientMessage::GetUsers);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
