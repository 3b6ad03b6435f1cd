//! Real-time chat core.
//!
//! - [`actor`]: the hub, sole owner of membership and broadcast order
//! - [`session`]: one connection split into inbound and outbound pumps
//! - [`queue`]: bounded per-session outbound queue
//! - [`envelope`]: wire format
//!
//! All cross-task communication goes through bounded queues. Nothing here
//! takes a lock.

pub mod actor;
pub mod envelope;
pub mod metrics;
pub mod queue;
pub mod session;

pub use actor::{Hub, HubHandle, Member};
pub use envelope::{EncodedEnvelope, InboundSubmission, OutboundEnvelope};
pub use metrics::{HubMetrics, HubMetricsSnapshot, RemovalReason};
pub use queue::{session_queue, EnqueueError, SessionId, SessionQueue, SessionReceiver};

use crate::config::{
    DEFAULT_BROADCAST_QUEUE_CAPACITY, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_READ_DEADLINE_SECONDS, DEFAULT_REGISTER_QUEUE_CAPACITY,
    DEFAULT_REPLAY_PACING_MS, DEFAULT_SESSION_QUEUE_CAPACITY,
    DEFAULT_UNREGISTER_QUEUE_CAPACITY, DEFAULT_WRITE_DEADLINE_SECONDS,
};
use std::time::Duration;

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub broadcast_queue_capacity: usize,
    pub register_queue_capacity: usize,
    pub unregister_queue_capacity: usize,
    /// Messages replayed to each new member.
    pub history_limit: usize,
    /// Delay between replayed messages. Zero replays as one batch.
    pub replay_pacing: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_queue_capacity: DEFAULT_BROADCAST_QUEUE_CAPACITY,
            register_queue_capacity: DEFAULT_REGISTER_QUEUE_CAPACITY,
            unregister_queue_capacity: DEFAULT_UNREGISTER_QUEUE_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
            replay_pacing: Duration::from_millis(DEFAULT_REPLAY_PACING_MS),
        }
    }
}

/// Per-connection tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Silence longer than this ends the session.
    pub read_deadline: Duration,
    pub ping_period: Duration,
    /// Bound on each write to the connection.
    pub write_deadline: Duration,
    pub max_frame_bytes: usize,
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let read_deadline = Duration::from_secs(DEFAULT_READ_DEADLINE_SECONDS);
        Self {
            read_deadline,
            ping_period: read_deadline * 9 / 10,
            write_deadline: Duration::from_secs(DEFAULT_WRITE_DEADLINE_SECONDS),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            queue_capacity: DEFAULT_SESSION_QUEUE_CAPACITY,
        }
    }
}
