//! Guest side of a coopsweeper session.
//!
//! A guest looks a session up over HTTP, opens a WebSocket to the host and
//! keeps a [`Mirror`] of the host's board up to date from the messages that
//! arrive:
//!
//! ```rust,no_run
//! use coopsweeper_client::{GuestWebSocket, Mirror, SessionClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = SessionClient::new("http://192.168.1.20:8000")?;
//!     let info = client.lookup("K7QX2").await?;
//!     println!("{}x{} with {} players", info.rows, info.cols, info.players);
//!
//!     let ws = GuestWebSocket::connect(&client.websocket_url("K7QX2", "Player12")?).await?;
//!     let (to_host, mut from_host) = ws.into_channels();
//!     to_host.send(coopsweeper_client::Message::click(coopsweeper_client::Pos::new(0, 0)))?;
//!
//!     let mut mirror = Mirror::new();
//!     while let Some(message) = from_host.recv().await {
//!         mirror.apply(message);
//!         for event in mirror.take_events() {
//!             println!("{:?}", event);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod game;
mod websocket;

pub use client::SessionClient;
pub use game::{GameEvent, GameState, Mirror};
pub use websocket::GuestWebSocket;

pub use coopsweeper_common::{models::*, protocol::*};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
