use coopsweeper_common::protocol::Message;
use futures_util::{SinkExt, StreamExt, stream::SplitStream};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as Frame,
};
use tracing::{debug, info, warn};

use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsReader = SplitStream<WsStream>;

/// WebSocket link from a guest to its host
pub struct GuestWebSocket {
    sender: mpsc::UnboundedSender<Message>,
    reader: WsReader,
    writer_task: JoinHandle<()>,
}

impl GuestWebSocket {
    /// Connect to a host session via WebSocket
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, _) = connect_async(url).await?;
        info!("WebSocket connected successfully");

        let (writer, reader) = ws_stream.split();

        // Outgoing messages are queued here so sending never waits on the socket
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(message) = receiver.recv().await {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                debug!("Sending message: {}", json);
                if let Err(e) = writer.send(Frame::Text(json.into())).await {
                    warn!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }

            let _ = writer.close().await;
        });

        Ok(Self {
            sender,
            reader,
            writer_task,
        })
    }

    /// Receive the next message from the host, skipping anything that does
    /// not parse. Returns None once the connection is closed.
    pub async fn receive_message(&mut self) -> Result<Option<Message>> {
        while let Some(frame) = self.reader.next().await {
            match frame? {
                Frame::Text(text) => {
                    debug!("Received message: {}", text);
                    match Message::from_json(&text) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => warn!("Ignoring malformed message: {}", e),
                    }
                }
                Frame::Close(_) => {
                    info!("WebSocket connection closed");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Split into an outgoing sender and a stream of host messages.
    ///
    /// The receiver closes when the connection drops; the writer stops once
    /// every sender clone is gone.
    pub fn into_channels(
        mut self,
    ) -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let sender = self.sender.clone();
        let (inbound, messages) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match self.receive_message().await {
                    Ok(Some(message)) => {
                        if inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error receiving WebSocket message: {}", e);
                        break;
                    }
                }
            }
            self.writer_task.abort();
        });

        (sender, messages)
    }
}
