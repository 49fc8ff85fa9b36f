//! Live socket registry, grouped by chat room.
//!
//! Each open chat socket registers the sender half of its outbound
//! channel under its room id. Broadcasting a stored message delivers it
//! to every socket in the room, the originating one included — the echo
//! is how clients learn a send was stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

use skillnet_proto::room::RoomId;

/// One registered socket.
struct Member {
    conn_id: u64,
    sender: mpsc::UnboundedSender<Message>,
}

/// Registry of open sockets per room.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Vec<Member>>>,
    next_conn_id: AtomicU64,
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket in a room, returning its connection id.
    pub async fn join(&self, room: &RoomId, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.rooms
            .write()
            .await
            .entry(room.clone())
            .or_default()
            .push(Member { conn_id, sender });
        tracing::debug!(room = %room, conn_id, "socket joined room");
        conn_id
    }

    /// Remove a socket from a room. Empty rooms are dropped.
    pub async fn leave(&self, room: &RoomId, conn_id: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|m| m.conn_id != conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        tracing::debug!(room = %room, conn_id, "socket left room");
    }

    /// Send a text frame to every socket in a room. Sockets whose channel
    /// has closed are skipped; their reader task cleans them up.
    pub async fn broadcast(&self, room: &RoomId, text: &str) {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return;
        };
        for member in members {
            let _ = member.sender.send(Message::Text(text.into()));
        }
    }

    /// Number of sockets currently in a room.
    pub async fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.read().await.get(room).map_or(0, Vec::len)
    }

    /// Send a Close frame to every socket in every room. Used to simulate
    /// server-side drops when exercising client reconnection.
    pub async fn close_all(&self) {
        let rooms = self.rooms.read().await;
        for (room, members) in rooms.iter() {
            tracing::info!(room = %room, count = members.len(), "closing room sockets");
            for member in members {
                let _ = member.sender.send(Message::Close(None));
            }
        }
    }
}
