//! Chat memory: session lifecycle and message history, grounded on
//! `chat_service.py`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ChatMessage, ChatSession, MessageRole};

pub struct ChatMemory {
    pool: PgPool,
}

impl ChatMemory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_session(&self, owner_id: Uuid) -> Result<ChatSession> {
        let session_key = Uuid::new_v4();
        let session = sqlx::query_as::<_, ChatSession>(
            r#"
            INSERT INTO chat_sessions (id, session_key, owner_id, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id, session_key, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_key)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn get_session_by_id(&self, session_id: Uuid) -> Result<ChatSession> {
        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT id, session_key, owner_id, created_at FROM chat_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("chat session '{session_id}' not found")))?;
        Ok(session)
    }

    pub async fn get_session_by_key(&self, session_key: Uuid) -> Result<ChatSession> {
        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT id, session_key, owner_id, created_at FROM chat_sessions WHERE session_key = $1",
        )
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("chat session '{session_key}' not found")))?;
        Ok(session)
    }

    async fn add_message(
        &self,
        executor: &mut sqlx::PgConnection,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING id, session_id, role, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(role)
        .bind(content)
        .fetch_one(executor)
        .await?;
        Ok(message)
    }

    /// Persist a completed user/assistant turn atomically, so a failure
    /// mid-stream never leaves a dangling user message with no answer.
    pub async fn add_turn(
        &self,
        session_id: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(ChatMessage, ChatMessage)> {
        let mut tx = self.pool.begin().await?;
        let user_message = self
            .add_message(&mut tx, session_id, MessageRole::User, user_text)
            .await?;
        let assistant_message = self
            .add_message(&mut tx, session_id, MessageRole::Assistant, assistant_text)
            .await?;
        tx.commit().await?;
        Ok((user_message, assistant_message))
    }

    /// Fetch the last `limit` messages for a session in ascending
    /// (chronological) order. Rows are fetched newest-first then reversed,
    /// matching the original's pagination-then-reverse approach.
    pub async fn get_messages(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_round_trips_through_serde() {
        let user = MessageRole::User;
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, "\"user\"");
    }
}
