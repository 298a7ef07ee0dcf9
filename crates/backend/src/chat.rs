//! WebSocket chat relay.
//!
//! Rooms are in-process broadcast channels created on first join. Delivery is
//! best effort: slow clients skip messages and nothing is stored.

use crate::SharedState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-room buffer before slow receivers start lagging.
pub const ROOM_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom { room: String },
    ChatMessage { room: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    PlayerJoined {
        room: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    NewMessage {
        room: String,
        #[serde(rename = "playerId")]
        player_id: String,
        message: String,
    },
}

#[derive(Default)]
pub struct ChatHub {
    rooms: Mutex<HashMap<String, broadcast::Sender<ServerEvent>>>,
}

impl ChatHub {
    fn rooms(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<ServerEvent>>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<ServerEvent> {
        self.rooms()
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe `player_id` to `room` and announce it to the members.
    pub fn join(&self, room: &str, player_id: &str) -> broadcast::Receiver<ServerEvent> {
        let rx = self.subscribe(room);
        self.publish(
            room,
            ServerEvent::PlayerJoined {
                room: room.to_string(),
                player_id: player_id.to_string(),
            },
        );
        rx
    }

    /// Send to every member of `room`; returns how many received it.
    pub fn publish(&self, room: &str, event: ServerEvent) -> usize {
        match self.rooms().get(room) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    /// Drop rooms nobody listens to any more.
    pub fn prune(&self) {
        self.rooms().retain(|_, tx| tx.receiver_count() > 0);
    }
}

pub fn chat_routes() -> Router<SharedState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let player_id = Uuid::new_v4().to_string();
    info!(%player_id, "chat client connected");
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to encode chat event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::JoinRoom { room }) => {
                if joined.contains_key(&room) {
                    continue;
                }
                let rx = state.chat.join(&room, &player_id);
                debug!(%player_id, %room, "joined room");
                joined.insert(room, tokio::spawn(forward(rx, out_tx.clone())));
            }
            Ok(ClientEvent::ChatMessage { room, message }) => {
                if !joined.contains_key(&room) {
                    debug!(%player_id, %room, "message for a room the client has not joined");
                    continue;
                }
                state.chat.publish(
                    &room,
                    ServerEvent::NewMessage {
                        room: room.clone(),
                        player_id: player_id.clone(),
                        message,
                    },
                );
            }
            Err(e) => debug!(error = %e, "ignoring malformed chat frame"),
        }
    }

    writer.abort();
    leave_rooms(&state.chat, joined).await;
    info!(%player_id, "chat client disconnected");
}

/// Stop a client's forwarders and drop rooms nobody listens to any more.
///
/// Each forwarder is awaited so its receiver is gone before pruning.
async fn leave_rooms(hub: &ChatHub, joined: HashMap<String, JoinHandle<()>>) {
    for (room, task) in joined {
        task.abort();
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!(%room, error = %e, "chat forwarder failed");
            }
        }
    }
    hub.prune();
}

async fn forward(mut rx: broadcast::Receiver<ServerEvent>, out: mpsc::UnboundedSender<ServerEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if out.send(event).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "chat client lagging, messages dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}
