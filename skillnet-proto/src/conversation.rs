//! Conversation directory wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the conversation directory.
///
/// Conversations are created implicitly server-side when two users first
/// exchange a message; the client only reads them. The directory endpoint
/// returns entries most-recent-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// The peer's username.
    pub username: String,
    /// The peer's first name.
    #[serde(default)]
    pub first_name: String,
    /// The peer's last name.
    #[serde(default)]
    pub last_name: String,
    /// Body of the most recent message in the conversation.
    pub last_message: String,
    /// Timestamp of the most recent message.
    pub last_message_time: DateTime<Utc>,
    /// Relative URL of the peer's avatar, if set.
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl ConversationSummary {
    /// The peer's display name, falling back to the username when the
    /// profile has no name set.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}
