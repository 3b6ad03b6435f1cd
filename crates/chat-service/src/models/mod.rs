//! Data models for the chat service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Chat Models
// ============================================================================

/// A persisted chat message.
///
/// Immutable once created. `username` is denormalized at write time so history
/// replay needs no identity lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    /// Database-generated identifier.
    pub id: i64,

    /// Numeric forum id of the author.
    pub user_id: i64,

    /// Author display name at the time of writing.
    pub username: String,

    /// Message text.
    pub content: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A chat message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewChatMessage {
    /// Attach the identifier assigned by the store.
    pub fn with_id(self, id: i64) -> ChatMessage {
        ChatMessage {
            id,
            user_id: self.user_id,
            username: self.username,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Session Identity
// ============================================================================

/// Identity bound to a chat session at admission time.
///
/// Messages never carry identity of their own; whatever the session was
/// admitted as is what gets persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Verified forum user with a resolved display name.
    Authenticated { user_id: i64, username: String },

    /// No valid credential was presented. Read-only.
    Anonymous,
}

impl Identity {
    /// Only authenticated sessions may publish.
    pub fn can_publish(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::Authenticated { user_id, .. } => Some(*user_id),
            Identity::Anonymous => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Authenticated { username, .. } => write!(f, "{username}"),
            Identity::Anonymous => write!(f, "anonymous"),
        }
    }
}

// ============================================================================
// Health Models
// ============================================================================

/// Readiness probe response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Hub loop status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
