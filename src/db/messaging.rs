//! Conversations and messages (PostgreSQL)

use async_trait::async_trait;
use uuid::Uuid;

use super::{offset, Database, StoreError, StoreResult};
use super::models::*;
use super::repository::MessagingRepository;

/// 참가자 순서 정규화 (a < b)
pub(crate) fn ordered_pair(x: Uuid, y: Uuid) -> (Uuid, Uuid) {
    if x < y {
        (x, y)
    } else {
        (y, x)
    }
}

#[async_trait]
impl MessagingRepository for Database {
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
        mission_id: Option<Uuid>,
    ) -> StoreResult<Conversation> {
        let (participant_a, participant_b) = ordered_pair(a, b);

        let existing = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE participant_a = $1 AND participant_b = $2
              AND mission_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(participant_a)
        .bind(participant_b)
        .bind(mission_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(conversation) = existing {
            return Ok(conversation);
        }

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b, mission_id, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(participant_a)
        .bind(participant_b)
        .bind(mission_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE participant_a = $1 OR participant_b = $1
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> StoreResult<Message> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(&mut *tx)
        .await?;

        // 보낸 사람이 아닌 쪽의 unread만 증가
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                last_message_at = $3,
                unread_a = unread_a + CASE WHEN participant_b = $2 THEN 1 ELSE 0 END,
                unread_b = unread_b + CASE WHEN participant_a = $2 THEN 1 ELSE 0 END
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("conversation"));
        }

        tx.commit().await?;
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Message>> {
        let items = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE conversations SET
                unread_a = CASE WHEN participant_a = $2 THEN 0 ELSE unread_a END,
                unread_b = CASE WHEN participant_b = $2 THEN 0 ELSE unread_b END
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_pair() {
        let x = Uuid::from_u128(1);
        let y = Uuid::from_u128(2);
        assert_eq!(ordered_pair(x, y), (x, y));
        assert_eq!(ordered_pair(y, x), (x, y));
    }
}
