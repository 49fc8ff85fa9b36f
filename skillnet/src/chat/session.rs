//! Live conversation session: history load, socket lifecycle, reconnection.
//!
//! A session moves through phases:
//!
//! ```text
//! LoadingHistory -> Connecting -> Open -> WaitingRetry -> Connecting -> ...
//!                                   \-> Closed (on close())
//!                        \-> Errored (history load or auth failure)
//! ```
//!
//! Reconnection uses a fixed delay and retries indefinitely; there is no
//! backoff and no attempt cap. Closing a session bumps its generation
//! counter, and the background loop checks the counter before every
//! connect attempt and after every retry delay — a superseded loop simply
//! returns, so a stale session can never reconnect over a newer one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use skillnet_proto::codec;
use skillnet_proto::message::{ChatMessage, InboundFrame, OutboundFrame, ValidationError};
use skillnet_proto::room::RoomId;

use crate::error::ApiError;
use crate::rest::RestClient;

/// Write half of the chat socket.
type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Fetching stored history over REST; no socket yet.
    LoadingHistory,
    /// Dialing the chat socket.
    Connecting,
    /// Socket established; sends are accepted.
    Open,
    /// Socket dropped; waiting out the retry delay.
    WaitingRetry,
    /// Closed by the owner. Terminal.
    Closed,
    /// Unrecoverable failure (history load or auth). Terminal.
    Errored,
}

/// Events delivered on the session's channel, in order of occurrence.
#[derive(Debug)]
pub enum SessionEvent {
    /// Stored history has been loaded into the transcript.
    HistoryLoaded {
        /// Number of messages loaded.
        count: usize,
    },
    /// The socket is open; sends will now be accepted.
    Connected,
    /// A message arrived on the socket (including echoes of our own sends).
    MessageReceived(ChatMessage),
    /// A transient problem that does not end the session, e.g. a per-frame
    /// server error or an undecodable frame.
    Warning(String),
    /// The socket dropped; a reconnect fires after `retry_in`.
    Disconnected {
        /// Fixed delay until the next connect attempt.
        retry_in: Duration,
    },
    /// The session hit an unrecoverable failure and will not reconnect.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No logged-in user to open a session as.
    #[error("not logged in")]
    NotLoggedIn,

    /// The history load failed; the session was not started.
    #[error("failed to load history: {0}")]
    History(#[source] ApiError),

    /// The message body failed client-side validation.
    #[error(transparent)]
    InvalidMessage(#[from] ValidationError),

    /// The socket is not open; the message was not sent.
    #[error("socket is not connected")]
    NotConnected,

    /// A previous send has not completed yet.
    #[error("a send is already in flight")]
    SendInFlight,

    /// The socket rejected the frame.
    #[error("socket send failed: {0}")]
    Transport(String),
}

/// State shared between the session handle and its background loop.
struct Shared {
    phase: RwLock<SessionPhase>,
    /// Bumped on close; a loop whose snapshot no longer matches is
    /// superseded and must not reconnect.
    generation: AtomicU64,
    /// The transcript: history followed by live messages, append-only.
    messages: RwLock<Vec<ChatMessage>>,
    /// Write half of the current socket, absent while disconnected.
    writer: Mutex<Option<WsSink>>,
    /// Guards against overlapping sends from the same handle.
    send_in_flight: AtomicBool,
}

/// Handle to a live conversation with one peer.
///
/// Obtained from [`crate::chat::ChatService::open`]. Dropping the handle
/// does not close the socket; call [`ConversationSession::close`].
pub struct ConversationSession {
    shared: Arc<Shared>,
    me: String,
    peer: String,
    room: RoomId,
}

impl ConversationSession {
    /// Load history, seed the transcript, and spawn the connect loop.
    pub(crate) async fn open(
        rest: RestClient,
        ws_base: Url,
        reconnect_delay: Duration,
        event_buffer: usize,
        peer: &str,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        let me = rest.tokens().username().ok_or(SessionError::NotLoggedIn)?;
        let room = RoomId::for_pair(&me, peer);
        let (events, events_rx) = mpsc::channel(event_buffer);

        let shared = Arc::new(Shared {
            phase: RwLock::new(SessionPhase::LoadingHistory),
            generation: AtomicU64::new(0),
            messages: RwLock::new(Vec::new()),
            writer: Mutex::new(None),
            send_in_flight: AtomicBool::new(false),
        });

        // History first; the socket is only dialed once the transcript is
        // seeded, so a live frame can never race the initial load.
        let history: Vec<ChatMessage> = rest
            .get(&format!("/api/chats/chat-history/{peer}/"))
            .await
            .map_err(|e| {
                *shared.phase.write() = SessionPhase::Errored;
                SessionError::History(e)
            })?;
        let count = history.len();
        *shared.messages.write() = history;
        let _ = events.send(SessionEvent::HistoryLoaded { count }).await;
        tracing::debug!(peer, count, "conversation history loaded");

        let generation = shared.generation.load(Ordering::Acquire);
        tokio::spawn(run_loop(
            Arc::clone(&shared),
            rest,
            ws_base,
            room.clone(),
            reconnect_delay,
            events,
            generation,
        ));

        Ok((
            Self {
                shared,
                me,
                peer: peer.to_string(),
                room,
            },
            events_rx,
        ))
    }

    /// Username of this side of the conversation.
    #[must_use]
    pub fn me(&self) -> &str {
        &self.me
    }

    /// Username of the conversation partner.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The room this session is attached to.
    #[must_use]
    pub const fn room(&self) -> &RoomId {
        &self.room
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.read()
    }

    /// Snapshot of the transcript (history plus live messages, in arrival
    /// order).
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.messages.read().clone()
    }

    /// Send a message to the peer.
    ///
    /// The transcript is not updated here: the server echoes every stored
    /// message back on the socket, and the echo is what gets appended. A
    /// message that never comes back was never stored.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidMessage`] before anything touches the wire,
    /// [`SessionError::NotConnected`] outside the `Open` phase,
    /// [`SessionError::SendInFlight`] while a previous send is pending,
    /// [`SessionError::Transport`] when the socket write fails.
    pub async fn send(&self, text: &str) -> Result<(), SessionError> {
        skillnet_proto::message::validate_body(text)?;
        if self.phase() != SessionPhase::Open {
            return Err(SessionError::NotConnected);
        }
        if self.shared.send_in_flight.swap(true, Ordering::AcqRel) {
            return Err(SessionError::SendInFlight);
        }
        let result = self.send_frame(text).await;
        self.shared.send_in_flight.store(false, Ordering::Release);
        result
    }

    async fn send_frame(&self, text: &str) -> Result<(), SessionError> {
        let frame = OutboundFrame {
            message: text.to_string(),
            sender_id: self.me.clone(),
            receiver_id: self.peer.clone(),
        };
        let encoded =
            codec::encode(&frame).map_err(|e| SessionError::Transport(e.to_string()))?;

        let mut writer = self.shared.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        sink.send(Message::Text(encoded.into()))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    /// Close the session: supersede the connect loop and drop the socket.
    ///
    /// Idempotent. Any loop still sleeping toward a reconnect observes the
    /// generation bump and exits instead of dialing.
    pub async fn close(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        *self.shared.phase.write() = SessionPhase::Closed;
        if let Some(mut sink) = self.shared.writer.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        tracing::debug!(room = %self.room, "session closed");
    }
}

/// The background connect/read/retry loop for one session generation.
///
/// Exits when the generation counter moves past `generation` (the session
/// was closed or replaced) or on an unrecoverable auth failure.
async fn run_loop(
    shared: Arc<Shared>,
    rest: RestClient,
    ws_base: Url,
    room: RoomId,
    reconnect_delay: Duration,
    events: mpsc::Sender<SessionEvent>,
    generation: u64,
) {
    let superseded = |shared: &Shared| shared.generation.load(Ordering::Acquire) != generation;

    loop {
        // The generation check and the phase write share the lock, so a
        // concurrent close() can never have its Closed overwritten.
        {
            let mut phase = shared.phase.write();
            if superseded(&shared) {
                return;
            }
            *phase = SessionPhase::Connecting;
        }

        // The socket authenticates via a token query parameter, so each
        // attempt needs an access token that will outlive the handshake.
        let url = match rest.ensure_fresh_access().await {
            Ok(access) => match socket_url(&ws_base, &room, &access) {
                Ok(url) => url,
                Err(e) => {
                    // Only possible with a malformed ws_base.
                    *shared.phase.write() = SessionPhase::Errored;
                    let _ = events
                        .send(SessionEvent::Failed {
                            reason: format!("invalid socket URL: {e}"),
                        })
                        .await;
                    return;
                }
            },
            Err(e) if e.is_auth() => {
                *shared.phase.write() = SessionPhase::Errored;
                let _ = events
                    .send(SessionEvent::Failed {
                        reason: format!("session expired: {e}"),
                    })
                    .await;
                return;
            }
            Err(e) => {
                // Transient refresh failure: treat like a failed dial.
                tracing::warn!(room = %room, error = %e, "token refresh failed before connect");
                if !wait_for_retry(&shared, &events, reconnect_delay, generation).await {
                    return;
                }
                continue;
            }
        };

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                let (mut sink, mut reader) = stream.split();
                // Closed while the dial was in flight: hang up the fresh
                // socket instead of resurrecting the session. close()
                // bumps the generation before it touches the writer, so
                // holding the writer lock across this check makes the
                // store-and-open atomic with respect to teardown.
                {
                    let mut writer = shared.writer.lock().await;
                    if superseded(&shared) {
                        drop(writer);
                        let _ = sink.send(Message::Close(None)).await;
                        tracing::debug!(room = %room, "socket discarded, session superseded");
                        return;
                    }
                    *writer = Some(sink);
                    *shared.phase.write() = SessionPhase::Open;
                }
                let _ = events.send(SessionEvent::Connected).await;
                tracing::info!(room = %room, "chat socket connected");

                while let Some(frame) = reader.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            handle_text_frame(&shared, &events, text.as_str()).await;
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {} // ping/pong/binary: nothing to do
                        Err(e) => {
                            tracing::warn!(room = %room, error = %e, "chat socket read failed");
                            break;
                        }
                    }
                }
                shared.writer.lock().await.take();
            }
            Err(e) => {
                tracing::warn!(room = %room, error = %e, "chat socket connect failed");
            }
        }

        if !wait_for_retry(&shared, &events, reconnect_delay, generation).await {
            return;
        }
    }
}

/// Decode one text frame and fold it into the session.
async fn handle_text_frame(shared: &Shared, events: &mpsc::Sender<SessionEvent>, text: &str) {
    match codec::decode_frame(text) {
        Ok(InboundFrame::Message(message)) => {
            shared.messages.write().push(message.clone());
            let _ = events.send(SessionEvent::MessageReceived(message)).await;
        }
        Ok(InboundFrame::Error { error }) => {
            tracing::warn!(error, "server reported a message error");
            let _ = events.send(SessionEvent::Warning(error)).await;
        }
        Err(e) => {
            // Skip the frame; the connection itself is fine.
            tracing::warn!(error = %e, "undecodable chat frame");
            let _ = events
                .send(SessionEvent::Warning(format!("undecodable frame: {e}")))
                .await;
        }
    }
}

/// Announce the disconnect, sleep out the fixed delay, and re-check the
/// generation. Returns `false` when the loop has been superseded.
async fn wait_for_retry(
    shared: &Shared,
    events: &mpsc::Sender<SessionEvent>,
    delay: Duration,
    generation: u64,
) -> bool {
    {
        let mut phase = shared.phase.write();
        if shared.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        *phase = SessionPhase::WaitingRetry;
    }
    let _ = events
        .send(SessionEvent::Disconnected { retry_in: delay })
        .await;
    tokio::time::sleep(delay).await;
    // Closed while sleeping: stand down without dialing.
    shared.generation.load(Ordering::Acquire) == generation
}

/// Build the authenticated socket URL for a room.
fn socket_url(ws_base: &Url, room: &RoomId, access: &str) -> Result<Url, url::ParseError> {
    let mut url = ws_base.join(&format!("ws/chat/{}/", room.as_str()))?;
    url.query_pairs_mut().append_pair("token", access);
    Ok(url)
}
