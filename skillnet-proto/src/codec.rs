//! JSON codec for wire payloads.
//!
//! Both the REST bodies and the chat socket frames are JSON. The helpers
//! here wrap `serde_json` with a crate-local error type and implement the
//! inbound-frame classification rule: a frame carrying an `error` field is
//! an error payload, anything else must parse as a message record.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::message::InboundFrame;

/// Errors from serializing or deserializing wire payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization to JSON failed.
    #[error("failed to serialize payload: {0}")]
    Serialize(serde_json::Error),

    /// Deserialization from JSON failed.
    #[error("failed to deserialize payload: {0}")]
    Deserialize(serde_json::Error),
}

/// Serialize a payload to a JSON string.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(CodecError::Serialize)
}

/// Deserialize a payload from a JSON string.
///
/// # Errors
///
/// Returns [`CodecError::Deserialize`] if the text is not valid JSON or
/// does not match the expected shape.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Deserialize)
}

/// Parse one chat socket frame.
///
/// # Errors
///
/// Returns [`CodecError::Deserialize`] when the frame is neither an error
/// payload nor a message record.
pub fn decode_frame(text: &str) -> Result<InboundFrame, CodecError> {
    decode(text)
}
