//! Persistence for chat messages.
//!
//! The hub and sessions only see the [`ChatStore`] trait. Production uses
//! [`ChatMessagesRepository`] over PostgreSQL; tests use [`mock::MockChatStore`].

pub mod chat_messages;

pub use chat_messages::ChatMessagesRepository;

use crate::errors::ChatError;
use crate::models::{ChatMessage, NewChatMessage};

/// Storage of chat messages.
#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a message and return its generated id.
    async fn save(&self, message: &NewChatMessage) -> Result<i64, ChatError>;

    /// The `limit` most recent messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, ChatError>;
}

/// In-memory store for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock chat store.
    ///
    /// Saved messages are appended to the history so `recent` sees them.
    pub struct MockChatStore {
        messages: Mutex<Vec<ChatMessage>>,
        saved: Mutex<Vec<NewChatMessage>>,
        next_id: AtomicI64,
        save_calls: AtomicUsize,
        recent_calls: AtomicUsize,
        fail_saves: bool,
        fail_recent: bool,
        delay: Option<Duration>,
    }

    impl MockChatStore {
        /// Empty store that accepts everything.
        pub fn new() -> Self {
            Self::with_history(Vec::new())
        }

        /// Store pre-loaded with `history` (oldest first).
        pub fn with_history(history: Vec<ChatMessage>) -> Self {
            let next_id = history.iter().map(|m| m.id).max().unwrap_or(0) + 1;
            Self {
                messages: Mutex::new(history),
                saved: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(next_id),
                save_calls: AtomicUsize::new(0),
                recent_calls: AtomicUsize::new(0),
                fail_saves: false,
                fail_recent: false,
                delay: None,
            }
        }

        /// Every `save` fails with a database error.
        pub fn failing_saves(mut self) -> Self {
            self.fail_saves = true;
            self
        }

        /// Every `recent` fails with a database error.
        pub fn failing_history(mut self) -> Self {
            self.fail_recent = true;
            self
        }

        /// Every call sleeps for `delay` first.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Messages passed to `save`, in call order.
        pub fn saved(&self) -> Vec<NewChatMessage> {
            self.saved.lock().map(|s| s.clone()).unwrap_or_default()
        }

        pub fn save_calls(&self) -> usize {
            self.save_calls.load(Ordering::SeqCst)
        }

        pub fn recent_calls(&self) -> usize {
            self.recent_calls.load(Ordering::SeqCst)
        }
    }

    impl Default for MockChatStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl ChatStore for MockChatStore {
        async fn save(&self, message: &NewChatMessage) -> Result<i64, ChatError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_saves {
                return Err(ChatError::Database("mock save failure".to_string()));
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut saved = self
                .saved
                .lock()
                .map_err(|_| ChatError::Internal("mock lock poisoned".to_string()))?;
            saved.push(message.clone());
            drop(saved);

            let mut messages = self
                .messages
                .lock()
                .map_err(|_| ChatError::Internal("mock lock poisoned".to_string()))?;
            messages.push(message.clone().with_id(id));
            Ok(id)
        }

        async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, ChatError> {
            self.recent_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_recent {
                return Err(ChatError::Database("mock history failure".to_string()));
            }

            let messages = self
                .messages
                .lock()
                .map_err(|_| ChatError::Internal("mock lock poisoned".to_string()))?;
            let skip = messages.len().saturating_sub(limit);
            Ok(messages.iter().skip(skip).cloned().collect())
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    mod tests {
        use super::*;
        use chrono::Utc;

        fn new_message(content: &str) -> NewChatMessage {
            NewChatMessage {
                user_id: 1,
                username: "alice".to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            }
        }

        #[tokio::test]
        async fn test_mock_save_assigns_increasing_ids() {
            let store = MockChatStore::new();

            let first = store.save(&new_message("a")).await.unwrap();
            let second = store.save(&new_message("b")).await.unwrap();

            assert!(second > first);
            assert_eq!(store.save_calls(), 2);
            assert_eq!(store.saved().len(), 2);
        }

        #[tokio::test]
        async fn test_mock_recent_returns_latest_oldest_first() {
            let store = MockChatStore::new();
            for content in ["a", "b", "c", "d"] {
                store.save(&new_message(content)).await.unwrap();
            }

            let recent = store.recent(2).await.unwrap();
            let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, vec!["c", "d"]);
        }

        #[tokio::test]
        async fn test_mock_failures() {
            let store = MockChatStore::new().failing_saves().failing_history();

            assert!(store.save(&new_message("a")).await.is_err());
            assert!(store.recent(5).await.is_err());
            assert!(store.saved().is_empty());
        }
    }
}
