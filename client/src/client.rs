use coopsweeper_common::models::SessionInfo;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::Result;

/// HTTP side of a host: session lookup and WebSocket addressing.
pub struct SessionClient {
    client: Client,
    base_url: Url,
}

impl SessionClient {
    /// Create a client for the host at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::new();

        Ok(Self { client, base_url })
    }

    /// Fetch lobby details for a session.
    /// Fails when the host is unreachable or does not know the code.
    pub async fn lookup(&self, session_id: &str) -> Result<SessionInfo> {
        let mut lookup_url = self.base_url.join("/session")?;
        lookup_url.query_pairs_mut().append_pair("id", session_id);

        let response = self.client.get(lookup_url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(format!("No session {} on this host", session_id).into());
        }
        if !response.status().is_success() {
            return Err(format!("Failed to look up session: {}", response.status()).into());
        }

        Ok(response.json().await?)
    }

    /// Get the WebSocket URL for joining a session as `username`
    pub fn websocket_url(&self, session_id: &str, username: &str) -> Result<String> {
        let mut ws_url = self.base_url.clone();
        ws_url
            .set_scheme(match self.base_url.scheme() {
                "https" => "wss",
                _ => "ws",
            })
            .map_err(|_| "Failed to set WebSocket scheme")?;
        ws_url.set_path("/ws");
        ws_url
            .query_pairs_mut()
            .clear()
            .append_pair("id", session_id)
            .append_pair("username", username);

        Ok(ws_url.to_string())
    }
}
