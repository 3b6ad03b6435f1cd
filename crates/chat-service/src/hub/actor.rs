//! The hub: single owner of chat membership and broadcast ordering.
//!
//! One task runs [`Hub::run`]. It waits on three bounded request queues
//! (register, unregister, broadcast) and handles exactly one request at a
//! time, so the membership map needs no lock. Everything else talks to it
//! through a cloneable [`HubHandle`].
//!
//! Slow consumers are disconnected: if a member's outbound queue is full when
//! the hub tries to enqueue, the member is removed and its queue closed. The
//! rest of the room is never held up by one reader.

use super::envelope::{EncodedEnvelope, OutboundEnvelope};
use super::metrics::{HubMetrics, HubMetricsSnapshot, RemovalReason};
use super::queue::{EnqueueError, SessionId, SessionQueue};
use super::HubConfig;
use crate::errors::ChatError;
use crate::models::Identity;
use crate::observability::metrics::record_broadcast_dropped;
use crate::services::ChatService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A session as seen by the hub.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: SessionId,
    pub identity: Identity,
    pub queue: SessionQueue,
}

/// Handle to the running hub.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Member>,
    unregister_tx: mpsc::Sender<SessionId>,
    broadcast_tx: mpsc::Sender<EncodedEnvelope>,
    cancel_token: CancellationToken,
    metrics: Arc<HubMetrics>,
}

impl HubHandle {
    /// Ask the hub to admit `member`.
    ///
    /// Waits only for room in the register queue, not for admission itself.
    pub async fn register(&self, member: Member) -> Result<(), ChatError> {
        self.register_tx
            .send(member)
            .await
            .map_err(|_| ChatError::HubUnavailable)
    }

    /// Ask the hub to remove a session. Safe to call more than once.
    pub async fn unregister(&self, id: SessionId) -> Result<(), ChatError> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| ChatError::HubUnavailable)
    }

    /// Submit a pre-encoded envelope for fan-out without waiting.
    ///
    /// # Errors
    ///
    /// - `ChatError::QueueFull` if the broadcast queue has no room
    /// - `ChatError::HubUnavailable` if the hub has stopped
    pub fn try_broadcast(&self, envelope: EncodedEnvelope) -> Result<(), ChatError> {
        self.broadcast_tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => ChatError::QueueFull,
            TrySendError::Closed(_) => ChatError::HubUnavailable,
        })
    }

    /// Current hub counters.
    pub fn metrics(&self) -> HubMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether the hub loop is still accepting requests.
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.register_tx.is_closed()
    }

    /// Stop the hub. Every member queue is closed on the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The hub actor.
pub struct Hub {
    config: HubConfig,
    chat: ChatService,
    members: HashMap<SessionId, Member>,
    register_rx: mpsc::Receiver<Member>,
    unregister_rx: mpsc::Receiver<SessionId>,
    broadcast_rx: mpsc::Receiver<EncodedEnvelope>,
    cancel_token: CancellationToken,
    metrics: Arc<HubMetrics>,
}

impl Hub {
    /// Spawn the hub loop.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `config` - Queue capacities, replay size and pacing
    /// * `chat` - Source of history replayed on admission
    /// * `cancel_token` - Process shutdown signal
    pub fn spawn(
        config: HubConfig,
        chat: ChatService,
        cancel_token: CancellationToken,
    ) -> (HubHandle, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(config.register_queue_capacity.max(1));
        let (unregister_tx, unregister_rx) =
            mpsc::channel(config.unregister_queue_capacity.max(1));
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue_capacity.max(1));
        let metrics = HubMetrics::new();

        let hub = Self {
            config,
            chat,
            members: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            cancel_token: cancel_token.clone(),
            metrics: metrics.clone(),
        };

        let task_handle = tokio::spawn(hub.run());

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            cancel_token,
            metrics,
        };

        (handle, task_handle)
    }

    /// Run the hub loop.
    #[instrument(skip_all, name = "chat.hub")]
    async fn run(mut self) {
        info!(target: "chat.hub", "Hub started");

        loop {
            // Registers first: a session's own register is then always
            // handled before its unregister or its broadcasts.
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(target: "chat.hub", "Hub received cancellation signal");
                    break;
                }

                Some(member) = self.register_rx.recv() => {
                    self.handle_register(member).await;
                }

                Some(id) = self.unregister_rx.recv() => {
                    self.handle_unregister(id);
                }

                Some(envelope) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(&envelope);
                }

                else => {
                    info!(target: "chat.hub", "All hub handles dropped, exiting");
                    break;
                }
            }
        }

        self.shutdown();
        info!(target: "chat.hub", "Hub stopped");
    }

    async fn handle_register(&mut self, member: Member) {
        if member.queue.is_closed() {
            debug!(
                target: "chat.hub",
                session_id = %member.id,
                "Session ended before admission, skipping"
            );
            return;
        }

        if self.members.contains_key(&member.id) {
            warn!(target: "chat.hub", session_id = %member.id, "Duplicate register ignored");
            return;
        }

        let id = member.id;
        let authenticated = member.identity.can_publish();
        info!(
            target: "chat.hub",
            session_id = %id,
            user_id = ?member.identity.user_id(),
            username = %member.identity,
            is_authenticated = authenticated,
            total_sessions = self.members.len() + 1,
            "Session registered"
        );

        self.members.insert(id, member);
        self.metrics
            .session_registered(authenticated, self.members.len());

        self.replay_history(id).await;
    }

    /// Enqueue recent history onto a freshly admitted member, oldest first.
    async fn replay_history(&mut self, id: SessionId) {
        let history = match self.chat.message_history(self.config.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    target: "chat.hub",
                    session_id = %id,
                    error = %e,
                    "Failed to load history, admitting without it"
                );
                self.metrics.history_failed();
                return;
            }
        };

        let total = history.len();
        for (i, message) in history.into_iter().enumerate() {
            if i > 0 && !self.config.replay_pacing.is_zero() {
                tokio::time::sleep(self.config.replay_pacing).await;
            }

            let payload = match OutboundEnvelope::NewMessage(message).encode() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(target: "chat.hub", error = %e, "Failed to encode history message");
                    continue;
                }
            };

            if !self.deliver(id, payload) {
                debug!(
                    target: "chat.hub",
                    session_id = %id,
                    replayed = i,
                    total,
                    "History replay stopped, session removed"
                );
                return;
            }
        }

        debug!(target: "chat.hub", session_id = %id, replayed = total, "History replayed");
    }

    fn handle_unregister(&mut self, id: SessionId) {
        if self.members.contains_key(&id) {
            self.remove(id, RemovalReason::Unregister);
        } else {
            debug!(target: "chat.hub", session_id = %id, "Unregister for non-member ignored");
        }
    }

    fn handle_broadcast(&mut self, envelope: &EncodedEnvelope) {
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for (id, member) in &self.members {
            match member.queue.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => evicted.push((*id, e)),
            }
        }

        for (id, e) in evicted {
            self.evict(id, e);
        }

        self.metrics.broadcast_processed(delivered);
        debug!(
            target: "chat.hub",
            delivered,
            total_sessions = self.members.len(),
            "Broadcast fanned out"
        );
    }

    /// Enqueue onto one member. Returns false if the member was removed.
    fn deliver(&mut self, id: SessionId, payload: EncodedEnvelope) -> bool {
        let Some(member) = self.members.get(&id) else {
            return false;
        };

        match member.queue.try_send(payload) {
            Ok(()) => true,
            Err(e) => {
                self.evict(id, e);
                false
            }
        }
    }

    fn evict(&mut self, id: SessionId, cause: EnqueueError) {
        let reason = match cause {
            EnqueueError::Full => {
                warn!(
                    target: "chat.hub",
                    session_id = %id,
                    "Outbound queue full, disconnecting slow consumer"
                );
                RemovalReason::SlowConsumer
            }
            EnqueueError::Closed => {
                debug!(target: "chat.hub", session_id = %id, "Outbound queue already closed");
                RemovalReason::Closed
            }
        };
        self.remove(id, reason);
    }

    /// Remove a member and close its queue. The close is what ends its
    /// outbound pump.
    fn remove(&mut self, id: SessionId, reason: RemovalReason) {
        let Some(member) = self.members.remove(&id) else {
            return;
        };

        self.metrics.session_removed(reason, self.members.len());
        member.queue.close();

        info!(
            target: "chat.hub",
            session_id = %id,
            username = %member.identity,
            reason = reason.as_str(),
            total_sessions = self.members.len(),
            "Session unregistered"
        );
    }

    fn shutdown(&mut self) {
        let ids: Vec<SessionId> = self.members.keys().copied().collect();
        for id in ids {
            self.remove(id, RemovalReason::Shutdown);
        }

        self.broadcast_rx.close();
        while self.broadcast_rx.try_recv().is_ok() {
            record_broadcast_dropped();
        }
        self.register_rx.close();
        while let Ok(member) = self.register_rx.try_recv() {
            member.queue.close();
        }
        self.unregister_rx.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hub::queue::session_queue;
    use crate::repositories::mock::MockChatStore;
    use std::time::Duration;

    fn test_config() -> HubConfig {
        HubConfig::default()
    }

    fn chat(store: MockChatStore) -> ChatService {
        ChatService::new(Arc::new(store), Duration::from_secs(5))
    }

    fn member(capacity: usize) -> (Member, crate::hub::queue::SessionReceiver) {
        let (queue, receiver) = session_queue(capacity);
        (
            Member {
                id: SessionId::new(),
                identity: Identity::Anonymous,
                queue,
            },
            receiver,
        )
    }

    async fn wait_for<F: Fn(&HubMetricsSnapshot) -> bool>(handle: &HubHandle, condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition(&handle.metrics()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("hub did not reach expected state");
    }

    #[tokio::test]
    async fn test_hub_spawn_and_cancel() {
        let cancel_token = CancellationToken::new();
        let (handle, task) = Hub::spawn(test_config(), chat(MockChatStore::new()), cancel_token);

        assert!(handle.is_running());

        handle.cancel();
        task.await.unwrap();

        assert!(handle.is_cancelled());
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_register_updates_metrics() {
        let (handle, _task) = Hub::spawn(
            test_config(),
            chat(MockChatStore::new()),
            CancellationToken::new(),
        );

        let (m, _rx) = member(8);
        handle.register(m).await.unwrap();

        wait_for(&handle, |s| s.active_sessions == 1).await;
        assert_eq!(handle.metrics().sessions_registered, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_register_of_closed_queue_is_skipped() {
        let (handle, _task) = Hub::spawn(
            test_config(),
            chat(MockChatStore::new()),
            CancellationToken::new(),
        );

        let (dead, _dead_rx) = member(8);
        dead.queue.close();
        handle.register(dead).await.unwrap();

        let (live, _live_rx) = member(8);
        handle.register(live).await.unwrap();

        wait_for(&handle, |s| s.sessions_registered == 1).await;
        assert_eq!(handle.metrics().active_sessions, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_try_broadcast_after_stop_reports_unavailable() {
        let (handle, task) = Hub::spawn(
            test_config(),
            chat(MockChatStore::new()),
            CancellationToken::new(),
        );
        handle.cancel();
        task.await.unwrap();

        let payload = OutboundEnvelope::error("late").encode().unwrap();
        assert!(matches!(
            handle.try_broadcast(payload),
            Err(ChatError::HubUnavailable)
        ));
        assert!(matches!(
            handle.unregister(SessionId::new()).await,
            Err(ChatError::HubUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_member_queues() {
        let (handle, task) = Hub::spawn(
            test_config(),
            chat(MockChatStore::new()),
            CancellationToken::new(),
        );

        let (m, mut rx) = member(8);
        handle.register(m).await.unwrap();
        wait_for(&handle, |s| s.active_sessions == 1).await;

        handle.cancel();
        task.await.unwrap();

        assert_eq!(rx.recv().await, None);
        assert_eq!(handle.metrics().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_history_failure_still_admits() {
        let (handle, _task) = Hub::spawn(
            test_config(),
            chat(MockChatStore::new().failing_history()),
            CancellationToken::new(),
        );

        let (m, _rx) = member(8);
        handle.register(m).await.unwrap();

        wait_for(&handle, |s| s.active_sessions == 1).await;
        assert_eq!(handle.metrics().history_failures, 1);

        handle.cancel();
    }
}
