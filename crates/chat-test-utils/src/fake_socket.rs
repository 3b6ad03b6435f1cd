//! In-memory connection for driving `hub::session::serve` without a network.
//!
//! The server side gets a `Sink`/`Stream` pair built from unbounded
//! channels; the test holds the other ends as a [`FakePeer`].

use axum::extract::ws::Message;
use chat_service::hub::{session, HubHandle, OutboundEnvelope, SessionConfig};
use chat_service::models::Identity;
use chat_service::services::ChatService;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Test side of an in-memory chat connection.
pub struct FakePeer {
    to_server: mpsc::UnboundedSender<Result<Message, Infallible>>,
    from_server: mpsc::UnboundedReceiver<Message>,
    pending: VecDeque<OutboundEnvelope>,
}

/// Start a session over an in-memory connection.
///
/// Returns the peer and the session task, which finishes when both pumps
/// have stopped.
pub fn open_session(
    identity: Identity,
    hub: &HubHandle,
    chat: &ChatService,
    config: SessionConfig,
) -> (FakePeer, JoinHandle<()>) {
    let (to_server, server_in) = mpsc::unbounded();
    let (server_out, from_server) = mpsc::unbounded();

    let task = tokio::spawn(session::serve(
        server_out,
        server_in,
        identity,
        hub.clone(),
        chat.clone(),
        config,
    ));

    (
        FakePeer {
            to_server,
            from_server,
            pending: VecDeque::new(),
        },
        task,
    )
}

impl FakePeer {
    pub fn send_text(&self, text: &str) {
        self.to_server
            .unbounded_send(Ok(Message::Text(text.to_string())))
            .expect("session stopped reading");
    }

    pub fn send_content(&self, content: &str) {
        self.send_text(&serde_json::json!({ "content": content }).to_string());
    }

    pub fn send_frame(&self, frame: Message) {
        self.to_server
            .unbounded_send(Ok(frame))
            .expect("session stopped reading");
    }

    /// Next envelope, splitting coalesced frames. Panics after five seconds.
    pub async fn next_envelope(&mut self) -> OutboundEnvelope {
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                return envelope;
            }

            let frame = tokio::time::timeout(Duration::from_secs(5), self.from_server.next())
                .await
                .expect("timed out waiting for an envelope")
                .expect("session closed the connection");

            if let Message::Text(text) = frame {
                for line in text.split('\n') {
                    let envelope = serde_json::from_str(line)
                        .unwrap_or_else(|e| panic!("bad envelope {line:?}: {e}"));
                    self.pending.push_back(envelope);
                }
            }
        }
    }

    /// True if no text frame arrives within `window`.
    pub async fn is_silent_for(&mut self, window: Duration) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.from_server.next()).await {
                Err(_) => return true,
                Ok(Some(Message::Text(_))) => return false,
                Ok(Some(_)) => {}
                Ok(None) => return true,
            }
        }
    }

    /// Every frame the server sends until it drops the connection.
    pub async fn drain_until_closed(&mut self) -> Vec<Message> {
        self.drain_until_closed_within(Duration::from_secs(5)).await
    }

    /// Like [`FakePeer::drain_until_closed`] with an explicit time limit.
    pub async fn drain_until_closed_within(&mut self, limit: Duration) -> Vec<Message> {
        let deadline = tokio::time::Instant::now() + limit;
        let mut frames = Vec::new();
        while let Some(frame) = tokio::time::timeout_at(deadline, self.from_server.next())
            .await
            .expect("session did not close the connection")
        {
            frames.push(frame);
        }
        frames
    }

    /// Simulate the peer vanishing without a close frame.
    pub fn disconnect(&self) {
        self.to_server.close_channel();
    }
}
