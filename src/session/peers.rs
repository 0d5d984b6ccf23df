use std::collections::HashMap;

use coopsweeper_common::protocol::{Message, PeerId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

struct Peer {
    username: String,
    outbox: UnboundedSender<Message>,
}

/// Open guest channels keyed by peer id.
///
/// Delivery never waits: each outbox is drained by that connection's
/// writer task in send order. A peer whose outbox has closed is dropped
/// the first time delivery to it fails.
#[derive(Default)]
pub struct ConnectionSet {
    peers: HashMap<PeerId, Peer>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: PeerId, username: String, outbox: UnboundedSender<Message>) {
        if self.peers.insert(id, Peer { username, outbox }).is_some() {
            warn!("Peer {} reconnected with the same id, replacing", id);
        }
        info!("Peer {} added, total connections: {}", id, self.peers.len());
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<String> {
        let removed = self.peers.remove(id).map(|peer| peer.username);
        match &removed {
            Some(username) => info!(
                "Peer {} ({}) removed, remaining connections: {}",
                id,
                username,
                self.peers.len()
            ),
            None => debug!("Peer {} already dropped after a failed send", id),
        }
        removed
    }

    pub fn username(&self, id: &PeerId) -> Option<&str> {
        self.peers.get(id).map(|peer| peer.username.as_str())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn send_to(&mut self, id: &PeerId, message: Message) {
        let delivered = self
            .peers
            .get(id)
            .is_some_and(|peer| peer.outbox.send(message).is_ok());
        if !delivered {
            debug!("Dropping closed peer {}", id);
            self.peers.remove(id);
        }
    }

    pub fn broadcast(&mut self, message: &Message) {
        self.broadcast_except(None, message);
    }

    pub fn broadcast_except(&mut self, skip: Option<&PeerId>, message: &Message) {
        let closed: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(id, _)| Some(*id) != skip)
            .filter(|(_, peer)| peer.outbox.send(message.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();

        for id in closed {
            debug!("Peer {} channel closed during {} broadcast", id, message.kind());
            self.peers.remove(&id);
        }
    }
}
