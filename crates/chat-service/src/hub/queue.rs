//! Per-session outbound queue.
//!
//! Many producers (hub fan-out, history replay, the session's own error
//! replies) and one consumer (the outbound pump). Producers never wait: a full
//! queue is reported back so the hub can apply its slow-consumer policy.
//!
//! Closing is explicit rather than tied to dropping senders, because the
//! session keeps a sender of its own for error replies. Payloads already
//! queued at close time are still handed to the consumer.

use super::envelope::EncodedEnvelope;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier of one chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Consumer is not keeping up.
    Full,
    /// Queue was closed or the consumer is gone.
    Closed,
}

/// Producer side of a session queue.
#[derive(Debug, Clone)]
pub struct SessionQueue {
    sender: mpsc::Sender<EncodedEnvelope>,
    closed: CancellationToken,
}

/// Consumer side of a session queue, owned by the outbound pump.
#[derive(Debug)]
pub struct SessionReceiver {
    receiver: mpsc::Receiver<EncodedEnvelope>,
    closed: CancellationToken,
}

/// Create a bounded session queue. Capacity is clamped to at least one.
pub fn session_queue(capacity: usize) -> (SessionQueue, SessionReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let closed = CancellationToken::new();
    (
        SessionQueue {
            sender,
            closed: closed.clone(),
        },
        SessionReceiver { receiver, closed },
    )
}

impl SessionQueue {
    /// Non-blocking enqueue.
    pub fn try_send(&self, payload: EncodedEnvelope) -> Result<(), EnqueueError> {
        if self.closed.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.sender.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// True once closed explicitly or once the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }
}

impl SessionReceiver {
    /// Next payload, waiting if none is queued.
    ///
    /// Returns `None` once the queue is closed and everything queued before
    /// the close has been handed out.
    pub async fn recv(&mut self) -> Option<EncodedEnvelope> {
        tokio::select! {
            biased;
            payload = self.receiver.recv() => payload,
            () = self.closed.cancelled() => self.receiver.try_recv().ok(),
        }
    }

    /// Next payload if one is already queued.
    pub fn try_recv(&mut self) -> Option<EncodedEnvelope> {
        self.receiver.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hub::envelope::OutboundEnvelope;

    fn payload(text: &str) -> EncodedEnvelope {
        OutboundEnvelope::error(text).encode().unwrap()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut receiver) = session_queue(4);
        queue.try_send(payload("a")).unwrap();
        queue.try_send(payload("b")).unwrap();
        queue.try_send(payload("c")).unwrap();

        assert_eq!(receiver.recv().await, Some(payload("a")));
        assert_eq!(receiver.try_recv(), Some(payload("b")));
        assert_eq!(receiver.recv().await, Some(payload("c")));
        assert_eq!(receiver.try_recv(), None);
    }

    #[tokio::test]
    async fn test_full_queue_reports_full() {
        let (queue, _receiver) = session_queue(2);
        queue.try_send(payload("a")).unwrap();
        queue.try_send(payload("b")).unwrap();

        assert_eq!(queue.try_send(payload("c")), Err(EnqueueError::Full));
    }

    #[tokio::test]
    async fn test_close_flushes_then_ends() {
        let (queue, mut receiver) = session_queue(4);
        queue.try_send(payload("a")).unwrap();
        queue.try_send(payload("b")).unwrap();
        queue.close();

        assert_eq!(queue.try_send(payload("c")), Err(EnqueueError::Closed));
        assert!(receiver.is_closed());
        assert_eq!(receiver.recv().await, Some(payload("a")));
        assert_eq!(receiver.recv().await, Some(payload("b")));
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (queue, mut receiver) = session_queue(1);
        queue.close();
        queue.clone().close();

        assert!(queue.is_closed());
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let (queue, mut receiver) = session_queue(1);
        let waiter = tokio::spawn(async move { receiver.recv().await });

        tokio::task::yield_now().await;
        queue.close();

        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropped_receiver_reports_closed() {
        let (queue, receiver) = session_queue(1);
        drop(receiver);

        assert!(queue.is_closed());
        assert_eq!(queue.try_send(payload("a")), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (queue, _receiver) = session_queue(0);
        assert!(queue.try_send(payload("a")).is_ok());
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
