//! WebSocket test client.
//!
//! The server may coalesce several envelopes into one text frame separated
//! by newlines. `ChatClient` splits them so tests always see one envelope at
//! a time.

use crate::server_harness::{TestChatServer, TEST_ORIGIN};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long to wait for a frame before failing the test.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected chat client.
pub struct ChatClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<Value>,
}

impl ChatClient {
    /// Connect with the test origin and an optional token.
    pub async fn connect(
        server: &TestChatServer,
        token: Option<&str>,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self::try_connect(server, token, Some(TEST_ORIGIN)).await?)
    }

    /// Connect with full control over the `Origin` header.
    ///
    /// A rejected upgrade comes back as `tungstenite::Error::Http` carrying
    /// the server's response.
    pub async fn try_connect(
        server: &TestChatServer,
        token: Option<&str>,
        origin: Option<&str>,
    ) -> Result<Self, tungstenite::Error> {
        let url = match token {
            Some(token) => format!("{}?token={}", server.ws_url(), token),
            None => server.ws_url(),
        };

        let mut request = url.into_client_request()?;
        if let Some(origin) = origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
            request.headers_mut().insert("Origin", value);
        }

        let (socket, _response) = connect_async(request).await?;
        Ok(Self {
            socket,
            pending: VecDeque::new(),
        })
    }

    /// Send `{"content": <content>}`.
    pub async fn send_content(&mut self, content: &str) -> Result<(), anyhow::Error> {
        let body = serde_json::json!({ "content": content }).to_string();
        self.send_raw(&body).await
    }

    /// Send an arbitrary text frame.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.socket.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Next envelope from the server, waiting up to five seconds.
    pub async fn next_envelope(&mut self) -> Result<Value, anyhow::Error> {
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                return Ok(envelope);
            }

            let frame = tokio::time::timeout(RECV_TIMEOUT, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for an envelope"))?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;

            match frame {
                Message::Text(text) => {
                    for line in text.split('\n').filter(|l| !l.is_empty()) {
                        self.pending.push_back(serde_json::from_str(line)?);
                    }
                }
                Message::Close(_) => anyhow::bail!("connection closed by server"),
                _ => {}
            }
        }
    }

    /// Next envelope, which must be `new_message`; returns its payload.
    pub async fn next_message(&mut self) -> Result<Value, anyhow::Error> {
        let envelope = self.next_envelope().await?;
        anyhow::ensure!(
            envelope["type"] == "new_message",
            "expected new_message, got {}",
            envelope
        );
        Ok(envelope["payload"].clone())
    }

    /// Next envelope, which must be `error`; returns its text.
    pub async fn next_error(&mut self) -> Result<String, anyhow::Error> {
        let envelope = self.next_envelope().await?;
        anyhow::ensure!(
            envelope["type"] == "error",
            "expected error, got {}",
            envelope
        );
        envelope["payload"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("error payload is not a string"))
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        if let Some(envelope) = self.pending.pop_front() {
            anyhow::bail!("unexpected envelope: {}", envelope);
        }
        match tokio::time::timeout(window, self.socket.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => Ok(()),
            Ok(other) => anyhow::bail!("unexpected frame: {:?}", other),
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) -> Result<(), anyhow::Error> {
        tokio::time::timeout(RECV_TIMEOUT, async {
            while let Some(frame) = self.socket.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("server did not close the connection"))
    }

    /// Close from the client side.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.socket.close(None).await?;
        Ok(())
    }
}
