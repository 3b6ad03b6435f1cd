//! In-process hub counters.
//!
//! Updated only by the hub loop and read from anywhere through a snapshot.
//! Each update is mirrored to the Prometheus facade in
//! `observability::metrics`.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Why a session left the membership set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The session asked to leave.
    Unregister,
    /// Its outbound queue was full.
    SlowConsumer,
    /// Its queue was already closed when the hub tried to deliver.
    Closed,
    /// The hub is shutting down.
    Shutdown,
}

impl RemovalReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Unregister => "unregister",
            RemovalReason::SlowConsumer => "slow_consumer",
            RemovalReason::Closed => "closed",
            RemovalReason::Shutdown => "shutdown",
        }
    }
}

/// Shared hub metrics.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Sessions currently in the membership set.
    pub active_sessions: AtomicUsize,
    /// Sessions admitted since start.
    pub sessions_registered: AtomicU64,
    /// Sessions removed since start, any reason.
    pub sessions_removed: AtomicU64,
    /// Sessions removed because they could not keep up.
    pub slow_consumer_disconnects: AtomicU64,
    /// Broadcast events processed.
    pub broadcasts: AtomicU64,
    /// Payloads enqueued onto member queues by broadcasts.
    pub deliveries: AtomicU64,
    /// History fetches that failed during admission.
    pub history_failures: AtomicU64,
}

/// Point-in-time copy of [`HubMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubMetricsSnapshot {
    pub active_sessions: usize,
    pub sessions_registered: u64,
    pub sessions_removed: u64,
    pub slow_consumer_disconnects: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub history_failures: u64,
}

impl HubMetrics {
    /// Create a new shared metrics instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn session_registered(&self, authenticated: bool, active: usize) {
        self.sessions_registered.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.store(active, Ordering::Relaxed);
        prom::record_session_registered(authenticated);
        prom::set_active_sessions(active);
    }

    pub(crate) fn session_removed(&self, reason: RemovalReason, active: usize) {
        self.sessions_removed.fetch_add(1, Ordering::Relaxed);
        if reason == RemovalReason::SlowConsumer {
            self.slow_consumer_disconnects
                .fetch_add(1, Ordering::Relaxed);
        }
        self.active_sessions.store(active, Ordering::Relaxed);
        prom::record_session_removed(reason.as_str());
        prom::set_active_sessions(active);
    }

    pub(crate) fn broadcast_processed(&self, delivered: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        prom::record_broadcast(delivered);
    }

    pub(crate) fn history_failed(&self) {
        self.history_failures.fetch_add(1, Ordering::Relaxed);
        prom::record_history_replay("error", 0);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_registered: self.sessions_registered.load(Ordering::Relaxed),
            sessions_removed: self.sessions_removed.load(Ordering::Relaxed),
            slow_consumer_disconnects: self.slow_consumer_disconnects.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            history_failures: self.history_failures.load(Ordering::Relaxed),
        }
    }
}
