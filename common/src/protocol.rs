use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CellUpdate, GameSnapshot, Pos};

/// Identifier of one end of a peer channel.
pub type PeerId = Uuid;

/// Peer id a guest attributes to everything arriving from its host.
pub const HOST: PeerId = Uuid::nil();

/// Everything that travels over a peer channel, in either direction.
///
/// `state`, `reveal`, `timer` and `gameOver` only ever come from the host.
/// `click` only ever comes from a guest. `flag` is a request when a guest
/// sends it and the authoritative result when the host echoes it; `chat`
/// bypasses game logic entirely.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "state")]
    State { state: GameSnapshot },
    #[serde(rename = "reveal")]
    Reveal { cells: Vec<CellUpdate> },
    #[serde(rename = "flag")]
    Flag {
        row: usize,
        col: usize,
        #[serde(default)]
        flagged: bool,
        #[serde(default, rename = "flagsPlaced")]
        flags_placed: usize,
    },
    #[serde(rename = "timer")]
    Timer { time: u64 },
    #[serde(rename = "gameOver")]
    GameOver {
        win: bool,
        #[serde(
            default,
            rename = "loserName",
            skip_serializing_if = "Option::is_none"
        )]
        loser_name: Option<String>,
    },
    #[serde(rename = "click")]
    Click { row: usize, col: usize },
    #[serde(rename = "chat")]
    Chat {
        message: String,
        #[serde(rename = "senderUsername")]
        sender_username: String,
    },
}

impl Message {
    /// Guest-side flag request; the host fills in the rest.
    pub fn flag_request(pos: Pos) -> Self {
        Message::Flag {
            row: pos.row,
            col: pos.col,
            flagged: false,
            flags_placed: 0,
        }
    }

    pub fn click(pos: Pos) -> Self {
        Message::Click {
            row: pos.row,
            col: pos.col,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::State { .. } => "state",
            Message::Reveal { .. } => "reveal",
            Message::Flag { .. } => "flag",
            Message::Timer { .. } => "timer",
            Message::GameOver { .. } => "gameOver",
            Message::Click { .. } => "click",
            Message::Chat { .. } => "chat",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Receiving side of a peer channel.
///
/// The host and a guest react to the same vocabulary in different ways, so
/// each role has its own implementation selected once when the session
/// starts.
pub trait MessageHandler {
    fn handle_message(&mut self, from: PeerId, message: Message);
}
