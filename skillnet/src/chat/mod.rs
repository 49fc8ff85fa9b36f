//! Conversation directory and live chat sessions.
//!
//! [`ChatService`] is the entry point: it lists the user's conversation
//! partners and opens a [`ConversationSession`] against one of them. The
//! session owns the socket lifecycle (connect, receive, reconnect) and is
//! described in [`session`].

pub mod session;

use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use skillnet_proto::conversation::ConversationSummary;
use skillnet_proto::message::ChatMessage;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::rest::RestClient;

pub use session::{ConversationSession, SessionError, SessionEvent, SessionPhase};

/// Chat operations: the conversation directory plus session construction.
#[derive(Clone)]
pub struct ChatService {
    rest: RestClient,
    ws_base: Url,
    reconnect_delay: Duration,
    event_buffer: usize,
}

impl ChatService {
    /// Create a chat service bound to a REST client and the resolved
    /// configuration.
    #[must_use]
    pub fn new(rest: RestClient, config: &ClientConfig) -> Self {
        Self {
            rest,
            ws_base: config.ws_base.clone(),
            reconnect_delay: config.reconnect_delay,
            event_buffer: config.event_buffer,
        }
    }

    /// List the logged-in user's conversations, most recent first as the
    /// server orders them.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.rest.get("/api/chats/conversations/").await
    }

    /// Fetch the stored message history with one conversation partner.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn history(&self, peer: &str) -> Result<Vec<ChatMessage>, ApiError> {
        self.rest
            .get(&format!("/api/chats/chat-history/{peer}/"))
            .await
    }

    /// Open a live session with `peer`: load history, then connect the
    /// socket in the background.
    ///
    /// Returns the session handle and the event stream. The first event is
    /// always [`SessionEvent::HistoryLoaded`]; the handle is usable for
    /// [`ConversationSession::send`] once [`SessionEvent::Connected`]
    /// arrives.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotLoggedIn`] without a session,
    /// [`SessionError::History`] when the history load fails. Socket
    /// failures after this point are reported through the event stream,
    /// not as errors here.
    pub async fn open(
        &self,
        peer: &str,
    ) -> Result<(ConversationSession, mpsc::Receiver<SessionEvent>), SessionError> {
        ConversationSession::open(
            self.rest.clone(),
            self.ws_base.clone(),
            self.reconnect_delay,
            self.event_buffer,
            peer,
        )
        .await
    }
}
