//! Error types for the protocol layer.
//!
//! Each crate in Convoy defines its own error enum. When you see a
//! `ProtocolError` you know the problem is in serialization or
//! deserialization, not in networking or session state.

/// Errors that can occur while encoding or decoding wire messages.
///
/// `#[derive(thiserror::Error)]` generates the `std::error::Error`
/// implementation; the `#[error("...")]` attributes define the message you
/// see when the error is printed or logged.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into wire text).
    ///
    /// Rare in practice — our message types always serialize — but the
    /// codec surface is generic, so the case exists.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning wire text into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `"type"` value, missing
    /// required fields, or wrong field types. The gateway answers these
    /// with an `error` message and keeps the connection open.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
