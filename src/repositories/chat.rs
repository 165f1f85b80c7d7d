use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row};

use super::{new_id, parse_column};
use crate::models::chat::{ChatMessage, ConversationSummary, Sender};

impl<'r> FromRow<'r, SqliteRow> for ChatMessage {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ChatMessage {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            sender: parse_column(row, "sender")?,
            body: row.try_get("body")?,
            read: row.try_get("read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for ConversationSummary {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ConversationSummary {
            user_id: row.try_get("user_id")?,
            last_message_at: row.try_get("last_message_at")?,
            unread: row.try_get("unread")?,
        })
    }
}

#[derive(Clone)]
pub struct ChatRepository {
    conn: SqlitePool,
}

impl ChatRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_message(
        &self,
        user_id: &str,
        sender: Sender,
        body: &str,
    ) -> Result<ChatMessage, anyhow::Error> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
                INSERT INTO chat_messages (id, user_id, sender, body, read, created_at)
                VALUES (?, ?, ?, ?, 0, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(user_id)
        .bind(sender.as_str())
        .bind(body)
        .bind(Utc::now())
        .fetch_one(&self.conn)
        .await?;

        Ok(message)
    }

    /// Returns the conversation oldest first, after marking everything the
    /// other side sent as read by `reader`.
    pub async fn read_conversation(
        &self,
        user_id: &str,
        reader: Sender,
    ) -> Result<Vec<ChatMessage>, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        sqlx::query("UPDATE chat_messages SET read = 1 WHERE user_id = ? AND sender = ? AND read = 0")
            .bind(user_id)
            .bind(reader.other().as_str())
            .execute(&mut *tx)
            .await?;

        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(messages)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, anyhow::Error> {
        let conversations = sqlx::query_as::<_, ConversationSummary>(
            r#"
                SELECT user_id,
                       MAX(created_at) AS last_message_at,
                       SUM(CASE WHEN sender = 'user' AND read = 0 THEN 1 ELSE 0 END) AS unread
                FROM chat_messages
                GROUP BY user_id
                ORDER BY last_message_at DESC
            "#,
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(conversations)
    }

    pub async fn delete_conversation(&self, user_id: &str) -> Result<u64, anyhow::Error> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::users::NewUser;
    use crate::repositories::users::UserRepository;

    #[tokio::test]
    async fn reading_marks_only_the_other_side() {
        let pool = database::memory_pool().await;
        let user = UserRepository::new(pool.clone())
            .insert_user(&NewUser {
                id: None,
                email: "chat@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        let repository = ChatRepository::new(pool);

        repository.insert_message(&user.id, Sender::User, "hello").await.unwrap();
        repository.insert_message(&user.id, Sender::User, "anyone?").await.unwrap();

        let conversations = repository.list_conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].unread, 2);

        repository.insert_message(&user.id, Sender::Admin, "hi").await.unwrap();

        // The user reading does not clear the admin's unread count.
        let messages = repository.read_conversation(&user.id, Sender::User).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].body, "hello");
        assert_eq!(repository.list_conversations().await.unwrap()[0].unread, 2);

        repository.read_conversation(&user.id, Sender::Admin).await.unwrap();
        assert_eq!(repository.list_conversations().await.unwrap()[0].unread, 0);

        assert_eq!(repository.delete_conversation(&user.id).await.unwrap(), 3);
        assert!(repository.list_conversations().await.unwrap().is_empty());
    }
}
