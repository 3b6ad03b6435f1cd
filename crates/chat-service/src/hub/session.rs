//! One chat connection.
//!
//! [`serve`] registers the session with the hub and then runs two pumps
//! side by side until both finish:
//!
//! - the inbound pump reads frames under a read deadline, validates them,
//!   persists and hands new messages to the hub for broadcast;
//! - the outbound pump drains the session queue to the connection,
//!   coalescing whatever is already waiting, and sends periodic pings.
//!
//! When the inbound pump stops it unregisters and closes the queue, so the
//! outbound pump flushes what is left, sends a close frame and stops. When
//! the outbound pump stops first it cancels a per-connection token that the
//! inbound pump is also waiting on. Only the inbound pump unregisters; the
//! hub treats a second unregister as a no-op anyway.

use super::actor::{HubHandle, Member};
use super::envelope::{
    decode_submission, join_frames, EncodedEnvelope, OutboundEnvelope, ERR_AUTH_REQUIRED,
    ERR_EMPTY_CONTENT, ERR_INVALID_FORMAT, ERR_SAVE_FAILED,
};
use super::queue::{session_queue, EnqueueError, SessionId, SessionQueue, SessionReceiver};
use super::SessionConfig;
use crate::errors::ChatError;
use crate::models::Identity;
use crate::observability::metrics::{record_broadcast_dropped, record_inbound_rejection};
use crate::services::ChatService;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
enum WriteError {
    #[error("write failed: {0}")]
    Failed(String),

    #[error("write deadline exceeded")]
    Deadline,
}

/// Run a chat session over an already upgraded connection.
///
/// Returns once both pumps have stopped. Never fails: every error ends up
/// as "this session is disconnected".
#[instrument(skip_all, name = "chat.session", fields(username = %identity))]
pub async fn serve<W, R, E>(
    mut sink: W,
    stream: R,
    identity: Identity,
    hub: HubHandle,
    chat: ChatService,
    config: SessionConfig,
) where
    W: Sink<Message> + Unpin + Send,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    let id = SessionId::new();
    let (queue, receiver) = session_queue(config.queue_capacity);

    let member = Member {
        id,
        identity: identity.clone(),
        queue: queue.clone(),
    };
    if let Err(e) = hub.register(member).await {
        warn!(target: "chat.session", session_id = %id, error = %e, "Hub rejected session");
        let _ = sink.close().await;
        return;
    }

    info!(
        target: "chat.session",
        session_id = %id,
        user_id = ?identity.user_id(),
        is_authenticated = identity.can_publish(),
        "Session started"
    );

    let connection = CancellationToken::new();
    let inbound = Inbound {
        id,
        identity: &identity,
        hub: &hub,
        chat: &chat,
        queue: &queue,
    };

    tokio::join!(
        inbound.run(stream, &config, &connection),
        outbound(id, sink, receiver, &config, &connection),
    );

    info!(target: "chat.session", session_id = %id, "Session ended");
}

struct Inbound<'a> {
    id: SessionId,
    identity: &'a Identity,
    hub: &'a HubHandle,
    chat: &'a ChatService,
    queue: &'a SessionQueue,
}

impl Inbound<'_> {
    async fn run<R, E>(&self, mut stream: R, config: &SessionConfig, connection: &CancellationToken)
    where
        R: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: Display + Send,
    {
        loop {
            let next = tokio::select! {
                () = connection.cancelled() => {
                    debug!(target: "chat.session", session_id = %self.id, "Connection closed by writer");
                    break;
                }
                next = timeout(config.read_deadline, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => {
                    info!(
                        target: "chat.session",
                        session_id = %self.id,
                        deadline_secs = config.read_deadline.as_secs(),
                        "Read deadline expired"
                    );
                    break;
                }
                Ok(None) => {
                    debug!(target: "chat.session", session_id = %self.id, "Peer went away");
                    break;
                }
                Ok(Some(Err(e))) => {
                    debug!(target: "chat.session", session_id = %self.id, error = %e, "Read failed");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => {
                    if text.len() > config.max_frame_bytes {
                        warn!(
                            target: "chat.session",
                            session_id = %self.id,
                            frame_bytes = text.len(),
                            max_frame_bytes = config.max_frame_bytes,
                            "Oversized frame, disconnecting"
                        );
                        break;
                    }
                    self.handle_text(&text).await;
                }
                Message::Binary(_) => {
                    record_inbound_rejection("decode");
                    self.reply_error(ERR_INVALID_FORMAT);
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => {
                    debug!(target: "chat.session", session_id = %self.id, "Peer sent close");
                    break;
                }
            }
        }

        if let Err(e) = self.hub.unregister(self.id).await {
            debug!(target: "chat.session", session_id = %self.id, error = %e, "Unregister not delivered");
        }
        self.queue.close();
    }

    async fn handle_text(&self, text: &str) {
        let submission = match decode_submission(text) {
            Ok(submission) => submission,
            Err(e) => {
                debug!(target: "chat.session", session_id = %self.id, error = %e, "Undecodable frame");
                record_inbound_rejection("decode");
                self.reply_error(ERR_INVALID_FORMAT);
                return;
            }
        };

        let Identity::Authenticated { user_id, username } = self.identity else {
            record_inbound_rejection("unauthenticated");
            self.reply_error(ERR_AUTH_REQUIRED);
            return;
        };

        if submission.content.trim().is_empty() {
            record_inbound_rejection("empty");
            self.reply_error(ERR_EMPTY_CONTENT);
            return;
        }

        let message = match self
            .chat
            .save_message(*user_id, username, submission.content)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    target: "chat.session",
                    session_id = %self.id,
                    user_id,
                    error = %e,
                    "Message not saved"
                );
                record_inbound_rejection("persist");
                self.reply_error(ERR_SAVE_FAILED);
                return;
            }
        };

        let message_id = message.id;
        let payload = match OutboundEnvelope::NewMessage(message).encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(target: "chat.session", message_id, error = %e, "Failed to encode message");
                return;
            }
        };

        match self.hub.try_broadcast(payload) {
            Ok(()) => {
                debug!(target: "chat.session", session_id = %self.id, message_id, "Message submitted");
            }
            Err(ChatError::QueueFull) => {
                warn!(
                    target: "chat.session",
                    session_id = %self.id,
                    message_id,
                    "Broadcast queue full, message saved but not delivered"
                );
                record_broadcast_dropped();
            }
            Err(e) => {
                warn!(target: "chat.session", session_id = %self.id, message_id, error = %e, "Broadcast failed");
            }
        }
    }

    /// Error envelope for this session only.
    fn reply_error(&self, text: &str) {
        let payload = match OutboundEnvelope::error(text).encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(target: "chat.session", error = %e, "Failed to encode error envelope");
                return;
            }
        };

        match self.queue.try_send(payload) {
            Ok(()) => {}
            Err(EnqueueError::Full) => {
                warn!(target: "chat.session", session_id = %self.id, "Outbound queue full, error reply dropped");
            }
            Err(EnqueueError::Closed) => {}
        }
    }
}

async fn outbound<W>(
    id: SessionId,
    mut sink: W,
    mut receiver: SessionReceiver,
    config: &SessionConfig,
    connection: &CancellationToken,
) where
    W: Sink<Message> + Unpin + Send,
    W::Error: Display,
{
    let period = config.ping_period.max(Duration::from_millis(1));
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = connection.cancelled() => break,

            payload = receiver.recv() => {
                let Some(first) = payload else {
                    debug!(target: "chat.session", session_id = %id, "Queue closed, sending close frame");
                    let _ = write(&mut sink, Message::Close(None), config.write_deadline).await;
                    break;
                };

                let batch = drain_pending(first, &mut receiver);
                if let Err(e) = write(&mut sink, Message::Text(join_frames(&batch)), config.write_deadline).await {
                    debug!(target: "chat.session", session_id = %id, error = %e, "Write failed");
                    break;
                }
            }

            _ = ping.tick() => {
                if let Err(e) = write(&mut sink, Message::Ping(Vec::new()), config.write_deadline).await {
                    debug!(target: "chat.session", session_id = %id, error = %e, "Ping failed");
                    break;
                }
            }
        }
    }

    connection.cancel();
    let _ = timeout(config.write_deadline, sink.close()).await;
}

/// `first` plus whatever else is already queued.
fn drain_pending(first: EncodedEnvelope, receiver: &mut SessionReceiver) -> Vec<EncodedEnvelope> {
    let mut batch = vec![first];
    while let Some(next) = receiver.try_recv() {
        batch.push(next);
    }
    batch
}

async fn write<W>(sink: &mut W, frame: Message, deadline: Duration) -> Result<(), WriteError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Failed(e.to_string())),
        Err(_) => Err(WriteError::Deadline),
    }
}
