//! Chat use cases on top of a [`ChatStore`].
//!
//! Every store call is bounded by the persistence timeout, independent of
//! the connection's read and write deadlines.

use crate::errors::ChatError;
use crate::models::{ChatMessage, NewChatMessage};
use crate::observability::metrics::{record_history_replay, record_persistence};
use crate::repositories::ChatStore;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    persist_timeout: Duration,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, persist_timeout: Duration) -> Self {
        Self {
            store,
            persist_timeout,
        }
    }

    /// Persist a message written by `user_id` and return it with its id.
    ///
    /// The creation timestamp is assigned here, not by the client.
    #[instrument(skip_all, fields(user_id = user_id))]
    pub async fn save_message(
        &self,
        user_id: i64,
        username: &str,
        content: String,
    ) -> Result<ChatMessage, ChatError> {
        let message = NewChatMessage {
            user_id,
            username: username.to_string(),
            content,
            created_at: Utc::now(),
        };

        let id = self
            .bounded("save", self.store.save(&message))
            .await?;

        debug!(target: "chat.service", user_id, message_id = id, "Message saved");
        Ok(message.with_id(id))
    }

    /// The `limit` most recent messages, oldest first.
    #[instrument(skip_all, fields(limit = limit))]
    pub async fn message_history(&self, limit: usize) -> Result<Vec<ChatMessage>, ChatError> {
        let history = self
            .bounded("recent", self.store.recent(limit))
            .await?;
        record_history_replay("success", history.len());
        Ok(history)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.persist_timeout, call).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                record_persistence(operation, "success", elapsed);
                Ok(value)
            }
            Ok(Err(e)) => {
                record_persistence(operation, "error", elapsed);
                warn!(target: "chat.service", operation, error = %e, "Persistence call failed");
                Err(e)
            }
            Err(_) => {
                record_persistence(operation, "timeout", elapsed);
                warn!(
                    target: "chat.service",
                    operation,
                    timeout_ms = self.persist_timeout.as_millis() as u64,
                    "Persistence call timed out"
                );
                Err(ChatError::Timeout(operation.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::mock::MockChatStore;

    fn service(store: Arc<MockChatStore>) -> ChatService {
        ChatService::new(store, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_save_message_returns_generated_id() {
        let store = Arc::new(MockChatStore::new());
        let chat = service(store.clone());

        let before = Utc::now();
        let message = chat
            .save_message(42, "alice", "hello".to_string())
            .await
            .unwrap();

        assert_eq!(message.id, 1);
        assert_eq!(message.user_id, 42);
        assert_eq!(message.username, "alice");
        assert_eq!(message.content, "hello");
        assert!(message.created_at >= before);

        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].content, "hello");
    }

    #[tokio::test]
    async fn test_save_failure_propagates() {
        let store = Arc::new(MockChatStore::new().failing_saves());
        let chat = service(store);

        let result = chat.save_message(1, "bob", "hi".to_string()).await;
        assert!(matches!(result, Err(ChatError::Database(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_times_out() {
        let store = Arc::new(MockChatStore::new().with_delay(Duration::from_secs(30)));
        let chat = ChatService::new(store, Duration::from_secs(10));

        let result = chat.save_message(1, "bob", "hi".to_string()).await;
        assert!(matches!(result, Err(ChatError::Timeout(op)) if op == "save"));
    }

    #[tokio::test]
    async fn test_history_is_limited_and_ordered() {
        let store = Arc::new(MockChatStore::new());
        let chat = service(store);
        for content in ["one", "two", "three"] {
            chat.save_message(1, "alice", content.to_string())
                .await
                .unwrap();
        }

        let history = chat.message_history(2).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_times_out() {
        let store = Arc::new(MockChatStore::new().with_delay(Duration::from_secs(30)));
        let chat = ChatService::new(store, Duration::from_secs(1));

        let result = chat.message_history(20).await;
        assert!(matches!(result, Err(ChatError::Timeout(op)) if op == "recent"));
    }
}
