use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hikebot_common::{AuthUser, GroupMessage};

use super::api::SharedState;
use super::social::deliver_user_message;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-socket outbound queue. A socket that falls this far behind is dropped.
const SOCKET_QUEUE: usize = 64;

pub const CLOSE_UNAUTHORIZED: u16 = 4401;
pub const CLOSE_FORBIDDEN: u16 = 4403;

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    NewMessage { message: GroupMessage },
    MemberJoined { group_id: String, username: String },
    MemberLeft { group_id: String, username: String },
}

// ── Connection manager ───────────────────────────────────────────────

struct RoomSocket {
    conn_id: u64,
    tx: mpsc::Sender<String>,
}

/// Maps each group room to the open sockets of its members.
///
/// A user holds at most one socket per room; connecting again replaces the
/// earlier one, whose receiver then sees the channel close.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    rooms: Arc<Mutex<HashMap<String, HashMap<i64, RoomSocket>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for `user_id` in `group_id`.
    /// Returns the connection id and the receiving end of its queue.
    pub fn connect(&self, group_id: &str, user_id: i64) -> (u64, mpsc::Receiver<String>) {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(SOCKET_QUEUE);
        if let Ok(mut rooms) = self.rooms.lock() {
            rooms
                .entry(group_id.to_string())
                .or_default()
                .insert(user_id, RoomSocket { conn_id, tx });
        }
        (conn_id, rx)
    }

    /// Remove the socket only if it is still the one registered as `conn_id`.
    pub fn disconnect(&self, group_id: &str, user_id: i64, conn_id: u64) {
        let Ok(mut rooms) = self.rooms.lock() else {
            return;
        };
        if let Some(room) = rooms.get_mut(group_id) {
            if room.get(&user_id).is_some_and(|s| s.conn_id == conn_id) {
                room.remove(&user_id);
            }
            if room.is_empty() {
                rooms.remove(group_id);
            }
        }
    }

    /// Queue `payload` on every socket in the room, pruning sockets that are
    /// closed or full. Returns the number of sockets reached.
    pub fn broadcast_text(&self, group_id: &str, payload: &str) -> usize {
        let Ok(mut rooms) = self.rooms.lock() else {
            return 0;
        };
        let Some(room) = rooms.get_mut(group_id) else {
            return 0;
        };
        let mut delivered = 0;
        room.retain(|user_id, socket| match socket.tx.try_send(payload.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                debug!(group_id, user_id, error = %e, "Pruning websocket");
                false
            }
        });
        if room.is_empty() {
            rooms.remove(group_id);
        }
        delivered
    }

    /// Serialize once and broadcast to the room.
    pub fn broadcast_json(&self, group_id: &str, msg: &WsMessage) -> usize {
        match serde_json::to_string(msg) {
            Ok(json) => self.broadcast_text(group_id, &json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize WsMessage");
                0
            }
        }
    }

    #[cfg(test)]
    fn room_size(&self, group_id: &str) -> usize {
        self.rooms
            .lock()
            .map(|rooms| rooms.get(group_id).map_or(0, |r| r.len()))
            .unwrap_or(0)
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_code: String,
}

pub async fn group_ws_handler(
    ws: WebSocketUpgrade,
    Path(group_id): Path<String>,
    Query(auth): Query<WsAuthQuery>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, group_id, auth))
}

async fn handle_socket(
    mut socket: WebSocket,
    state: SharedState,
    group_id: String,
    auth: WsAuthQuery,
) {
    let user = state
        .db
        .call(move |db| db.find_user_by_identity(&auth.username, &auth.user_code))
        .await
        .ok()
        .flatten();
    let Some(user) = user else {
        close_with(&mut socket, CLOSE_UNAUTHORIZED, "Invalid auth").await;
        return;
    };

    let gid = group_id.clone();
    let uid = user.id;
    let is_member = state
        .db
        .call(move |db| Ok(db.member_role(&gid, uid)?.is_some()))
        .await
        .unwrap_or(false);
    if !is_member {
        close_with(&mut socket, CLOSE_FORBIDDEN, "Not a member").await;
        return;
    }

    let (conn_id, rx) = state.rooms.connect(&group_id, user.id);
    info!(group_id = %group_id, user = %user.username, conn_id, "Websocket connected");

    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx, &state, &group_id, &user).await;

    state.rooms.disconnect(&group_id, user.id, conn_id);
    info!(group_id = %group_id, user = %user.username, conn_id, "Websocket disconnected");
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Forwards queued room messages, stores incoming text frames as chat
/// messages, and exits when no Pong arrives within [`PONG_TIMEOUT`].
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: mpsc::Receiver<String>,
    state: &SharedState,
    group_id: &str,
    user: &AuthUser,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!(group_id, "Pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            queued = rx.recv() => {
                match queued {
                    Some(text) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Pruned, or replaced by a newer socket of the same user.
                    None => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let content = text.as_str().to_string();
                        if content.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) =
                            deliver_user_message(state, group_id.to_string(), user.clone(), content).await
                        {
                            warn!(group_id, error = %e.message(), "Failed to store websocket message");
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Tests ────────────────────────────────────────────────────────────
