//! Which side of the game this process plays.
//!
//! A process starts unconnected and picks a role exactly once. Hosting
//! applies intents to the authoritative board; guesting forwards them to the
//! host untouched and waits for the authoritative result.

pub mod host;
pub mod peers;

use coopsweeper_common::{
    models::{GameParams, Pos},
    protocol::Message,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use host::HostHandle;

/// A player action coming from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Reveal(Pos),
    ToggleFlag(Pos),
    Chat(String),
    Restart(GameParams),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Already {0}; the role cannot change during a session")]
    RoleTaken(&'static str),
    #[error("Not connected to a game. Host or join one first.")]
    NotConnected,
    #[error("Only the host can start a new game")]
    HostOnly,
    #[error("The game session has closed")]
    Closed,
}

#[derive(Debug, Default)]
pub enum Role {
    #[default]
    Unconnected,
    Hosting(HostHandle),
    Guesting(UnboundedSender<Message>),
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Unconnected => "unconnected",
            Role::Hosting(_) => "hosting",
            Role::Guesting(_) => "guesting",
        }
    }
}

pub struct Session {
    username: String,
    role: Role,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Unconnected,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_host(&self) -> bool {
        matches!(self.role, Role::Hosting(_))
    }

    /// Take the host role for the session behind `handle`.
    pub fn host(&mut self, handle: HostHandle) -> Result<(), SessionError> {
        self.claim()?;
        info!("{} is hosting session {}", self.username, handle.id());
        self.role = Role::Hosting(handle);
        Ok(())
    }

    /// Take the guest role; `link` is the channel to the host.
    pub fn join(&mut self, link: UnboundedSender<Message>) -> Result<(), SessionError> {
        self.claim()?;
        info!("{} joined as a guest", self.username);
        self.role = Role::Guesting(link);
        Ok(())
    }

    fn claim(&self) -> Result<(), SessionError> {
        match self.role {
            Role::Unconnected => Ok(()),
            ref taken => Err(SessionError::RoleTaken(taken.name())),
        }
    }

    /// Route a local intent according to the role.
    pub fn submit(&self, intent: Intent) -> Result<(), SessionError> {
        match &self.role {
            Role::Unconnected => Err(SessionError::NotConnected),
            Role::Hosting(handle) => {
                if handle.submit(intent) {
                    Ok(())
                } else {
                    Err(SessionError::Closed)
                }
            }
            Role::Guesting(link) => {
                let message = match intent {
                    Intent::Reveal(pos) => Message::click(pos),
                    Intent::ToggleFlag(pos) => Message::flag_request(pos),
                    Intent::Chat(message) => Message::Chat {
                        message,
                        sender_username: self.username.clone(),
                    },
                    Intent::Restart(_) => return Err(SessionError::HostOnly),
                };
                debug!("Forwarding {} to host", message.kind());
                link.send(message).map_err(|_| SessionError::Closed)
            }
        }
    }
}
