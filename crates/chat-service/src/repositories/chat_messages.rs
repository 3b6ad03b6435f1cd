//! Chat messages repository for database operations.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - Message content is never logged

use super::ChatStore;
use crate::errors::ChatError;
use crate::models::{ChatMessage, NewChatMessage};
use crate::observability::metrics::record_db_query;
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;

/// PostgreSQL-backed chat message store.
#[derive(Clone)]
pub struct ChatMessagesRepository {
    pool: PgPool,
}

impl ChatMessagesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a message and return its generated id.
    #[instrument(skip_all, fields(user_id = message.user_id))]
    pub async fn insert(pool: &PgPool, message: &NewChatMessage) -> Result<i64, ChatError> {
        let start = Instant::now();

        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO messages (user_id, username, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(message.user_id)
        .bind(&message.username)
        .bind(&message.content)
        .bind(message.created_at)
        .fetch_one(pool)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        record_db_query("insert_message", status, start.elapsed());

        let (id,) = result?;
        Ok(id)
    }

    /// Fetch the `limit` most recent messages, oldest first.
    #[instrument(skip_all, fields(limit = limit))]
    pub async fn latest(pool: &PgPool, limit: i64) -> Result<Vec<ChatMessage>, ChatError> {
        let start = Instant::now();

        let result: Result<Vec<ChatMessage>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT id, user_id, username, content, created_at
            FROM (
                SELECT id, user_id, username, content, created_at
                FROM messages
                ORDER BY created_at DESC, id DESC
                LIMIT $1
            ) recent
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        record_db_query("select_recent_messages", status, start.elapsed());

        Ok(result?)
    }
}

#[async_trait::async_trait]
impl ChatStore for ChatMessagesRepository {
    async fn save(&self, message: &NewChatMessage) -> Result<i64, ChatError> {
        Self::insert(&self.pool, message).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, ChatError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Self::latest(&self.pool, limit).await
    }
}
