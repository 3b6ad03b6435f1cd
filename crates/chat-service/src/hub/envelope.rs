//! Wire format of the chat connection.
//!
//! Outbound frames are JSON objects `{"type": ..., "payload": ...}` with
//! `type` one of `new_message` or `error`. Inbound frames are
//! `{"content": "..."}` and nothing else.
//!
//! When the outbound pump finds several payloads waiting it writes them in
//! one text frame separated by [`FRAME_SEPARATOR`]. Clients must therefore
//! parse one JSON object per line.

use crate::errors::ChatError;
use crate::models::ChatMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Separator between coalesced outbound payloads.
pub const FRAME_SEPARATOR: &str = "\n";

/// Reply to a frame that is not a valid submission.
pub const ERR_INVALID_FORMAT: &str = "Invalid message format";

/// Reply to a submission from an anonymous session.
pub const ERR_AUTH_REQUIRED: &str = "Sending messages is available only to authorized users";

/// Reply to a submission whose content is blank.
pub const ERR_EMPTY_CONTENT: &str = "Message content must not be empty";

/// Reply when the message could not be persisted.
pub const ERR_SAVE_FAILED: &str = "Failed to save message";

/// Server-to-client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    /// A message accepted into the room (live or replayed).
    NewMessage(ChatMessage),

    /// Human-readable notice addressed to a single session.
    Error(String),
}

impl OutboundEnvelope {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundEnvelope::Error(message.into())
    }

    /// Serialize once. The result is shared by every recipient.
    pub fn encode(&self) -> Result<EncodedEnvelope, ChatError> {
        let json = serde_json::to_string(self)?;
        Ok(EncodedEnvelope(Arc::from(json)))
    }
}

/// Pre-serialized outbound envelope. Cloning only bumps a refcount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEnvelope(Arc<str>);

impl EncodedEnvelope {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-to-server submission. Identity comes from the session, never from here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundSubmission {
    pub content: String,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not a valid submission: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Normalize whitespace the way clients may emit it: newlines become spaces,
/// surrounding whitespace is dropped.
pub fn normalize_frame(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ").trim().to_string()
}

/// Normalize and decode one inbound text frame.
pub fn decode_submission(raw: &str) -> Result<InboundSubmission, DecodeError> {
    let normalized = normalize_frame(raw);
    Ok(serde_json::from_str(&normalized)?)
}

/// Join pending payloads into the body of a single text frame.
pub fn join_frames(batch: &[EncodedEnvelope]) -> String {
    let capacity = batch.iter().map(|p| p.as_str().len() + 1).sum();
    let mut frame = String::with_capacity(capacity);
    for (i, payload) in batch.iter().enumerate() {
        if i > 0 {
            frame.push_str(FRAME_SEPARATOR);
        }
        frame.push_str(payload.as_str());
    }
    frame
}
