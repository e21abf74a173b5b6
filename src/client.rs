use anyhow::{Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::info;

/// A client for connecting to and interacting with the chat server.
pub struct Client {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    /// Opens a WebSocket connection to the chat server.
    ///
    /// # Arguments
    /// - `url`: The server URL (e.g., "ws://127.0.0.1:8080").
    ///
    /// # Returns
    /// A `Result` containing the `Client` or an error if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;
        info!("Connected to {}", url);
        Ok(Client { stream })
    }

    /// Sends one chat line as a text frame.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string().into())).await?;
        info!("Sent: {}", text);
        Ok(())
    }

    /// Waits for the next text frame from the server.
    ///
    /// # Returns
    /// The frame's text, or an error if the connection closed first.
    pub async fn receive(&mut self) -> Result<String> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(text.to_string()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(anyhow!("connection closed"))
    }

    /// Sends a close frame and waits for the server to acknowledge it.
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        while let Some(frame) = self.stream.next().await {
            if frame.is_err() {
                break;
            }
        }
        Ok(())
    }
}
