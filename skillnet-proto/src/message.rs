//! Chat message wire types.
//!
//! The messaging backend speaks JSON over two channels that share these
//! shapes: the history REST endpoint returns a list of [`ChatMessage`]
//! records, and the live WebSocket delivers one [`InboundFrame`] per text
//! frame. The only frame a client ever transmits is [`OutboundFrame`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed message body length in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// A chat message as stored and echoed by the server.
///
/// Received both from the history endpoint and from live socket frames.
/// Once displayed, a message is never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Username of the user who sent the message.
    pub sender: String,
    /// The message body.
    pub message: String,
    /// Server-assigned creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Server-assigned row id; absent on frames from older servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// The frame a client transmits on the chat socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// The message body.
    pub message: String,
    /// Username of the sender.
    pub sender_id: String,
    /// Username of the intended recipient.
    pub receiver_id: String,
}

/// A frame received on the chat socket.
///
/// The server sends either a stored message record or an error payload.
/// Error payloads are transient: the connection stays open and the frame
/// carries no message to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    /// A per-frame error from the server, e.g. "Failed to process message".
    Error {
        /// Human-readable reason.
        error: String,
    },
    /// A message echoed or relayed by the server.
    Message(ChatMessage),
}

/// Errors from client-side message validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The body is empty or whitespace-only.
    #[error("message body is empty")]
    Empty,
    /// The body exceeds [`MAX_MESSAGE_LEN`].
    #[error("message body too long: {len} chars (max {MAX_MESSAGE_LEN})")]
    TooLong {
        /// Actual length in characters.
        len: usize,
    },
}

/// Validate a message body before transmission.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty/whitespace-only text and
/// [`ValidationError::TooLong`] for bodies over [`MAX_MESSAGE_LEN`] chars.
pub fn validate_body(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(ValidationError::TooLong { len });
    }
    Ok(())
}
