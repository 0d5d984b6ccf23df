use std::sync::Arc;

use coopsweeper_common::{models::SessionInfo, protocol::Message};
use dashmap::{DashMap, Entry};
use nanoid::nanoid;
use rocket::{
    State,
    futures::{SinkExt, StreamExt},
    get,
    http::Status,
    serde::json::Json,
};
use rocket_ws::{Channel, Message as Frame, WebSocket};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::session::host::HostHandle;

pub type Sessions = Arc<DashMap<String, HostHandle>>;

/// Session codes are read aloud and typed by hand.
const CODE_ALPHABET: [char; 32] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Reserve a fresh session code and register the session `spawn` starts
/// under it.
#[instrument(level = "trace", skip(sessions, spawn))]
pub fn register_session(
    sessions: &Sessions,
    id_length: usize,
    spawn: impl FnOnce(String) -> HostHandle,
) -> String {
    let mut id_length = id_length;
    let max_attempts_per_length = 10;
    let mut spawn = Some(spawn);

    loop {
        for _ in 0..max_attempts_per_length {
            let id = nanoid!(id_length, &CODE_ALPHABET);
            match sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Session code collision, trying another: {}", id);
                    continue;
                }
                Entry::Vacant(entry) => {
                    if let Some(spawn) = spawn.take() {
                        entry.insert(spawn(id.clone()));
                    }
                    info!("Registered session {}", id);
                    return id;
                }
            }
        }

        warn!(
            "Exhausted code attempts at length {}, increasing to {}",
            id_length,
            id_length + 1
        );
        id_length += 1;
    }
}

fn lookup(sessions: &Sessions, id: &str) -> Option<HostHandle> {
    let handle = sessions.get(id).map(|entry| entry.value().clone())?;
    if handle.is_closed() {
        sessions.remove(id);
        info!("Removed closed session {}", id);
        return None;
    }
    Some(handle)
}

#[get("/session?<id>")]
#[instrument(level = "trace", skip(sessions))]
pub async fn session_info(id: String, sessions: &State<Sessions>) -> Result<Json<SessionInfo>, Status> {
    let Some(handle) = lookup(sessions, &id) else {
        warn!("Lookup for non-existent session: {}", id);
        return Err(Status::NotFound);
    };

    handle.describe().await.map(Json).ok_or(Status::NotFound)
}

#[get("/ws?<id>&<username>")]
#[instrument(level = "trace", skip(ws, sessions), fields(session = %id))]
pub fn websocket_handler(
    ws: WebSocket,
    sessions: &State<Sessions>,
    id: String,
    username: Option<String>,
) -> Result<Channel<'static>, Status> {
    let Some(handle) = lookup(sessions, &id) else {
        warn!("WebSocket connection attempt for non-existent session: {}", id);
        return Err(Status::NotFound);
    };
    let username = username
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Guest".to_string());

    Ok(ws.channel(move |stream| {
        Box::pin(async move {
            let (mut write, mut read) = stream.split();
            let peer = Uuid::new_v4();
            let (outbox, mut inbox) = mpsc::unbounded_channel::<Message>();

            if !handle.connect(peer, username.clone(), outbox) {
                warn!("Session {} closed before {} could join", id, username);
                return Ok(());
            }
            info!("{} connected to session {} (peer: {})", username, id, peer);

            let writer = tokio::spawn(async move {
                while let Some(message) = inbox.recv().await {
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize {} message: {}", message.kind(), e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Frame::Text(text)).await {
                        debug!("Peer {} stopped accepting frames: {}", peer, e);
                        break;
                    }
                }
                let _ = write.close().await;
            });

            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Frame::Text(text)) => match Message::from_json(&text) {
                        Ok(message) => {
                            debug!("Received {} from peer {}", message.kind(), peer);
                            if !handle.deliver(peer, message) {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid message from peer {}: {} - Error: {}", peer, text, e);
                        }
                    },
                    Ok(Frame::Close(_)) => {
                        info!("Peer {} closed the connection", peer);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error in session {} (peer: {}): {}", id, peer, e);
                        break;
                    }
                    _ => {
                        debug!("Ignoring non-text frame from peer {}", peer);
                    }
                }
            }

            handle.disconnect(peer);
            writer.abort();
            info!("{} left session {} (peer: {})", username, id, peer);
            Ok(())
        })
    }))
}
