use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};

use super::{new_id, parse_column};
use crate::models::content::{ContactRequest, ContactStatus, NewContactRequest};

impl<'r> FromRow<'r, SqliteRow> for ContactRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ContactRequest {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            subject: row.try_get("subject")?,
            message: row.try_get("message")?,
            status: parse_column(row, "status")?,
            reply: row.try_get("reply")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct ContactRepository {
    conn: SqlitePool,
}

impl ContactRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_request(
        &self,
        request: &NewContactRequest,
    ) -> Result<ContactRequest, anyhow::Error> {
        let now = Utc::now();

        let request = sqlx::query_as::<_, ContactRequest>(
            r#"
                INSERT INTO contact_requests
                (id, name, email, subject, message, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(request.name.trim())
        .bind(request.email.trim())
        .bind(&request.subject)
        .bind(&request.message)
        .bind(ContactStatus::Open.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(request)
    }

    pub async fn list_requests(
        &self,
        status: Option<ContactStatus>,
    ) -> Result<Vec<ContactRequest>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM contact_requests");
        if let Some(status) = status {
            query.push(" WHERE status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let requests = query
            .build_query_as::<ContactRequest>()
            .fetch_all(&self.conn)
            .await?;
        Ok(requests)
    }

    /// Stores the reply and closes the request.
    pub async fn reply(
        &self,
        id: &str,
        reply: &str,
    ) -> Result<Option<ContactRequest>, anyhow::Error> {
        let request = sqlx::query_as::<_, ContactRequest>(
            "UPDATE contact_requests SET reply = ?, status = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(reply)
        .bind(ContactStatus::Closed.as_str())
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(request)
    }

    pub async fn delete_request(&self, id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM contact_requests WHERE id = ?")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes every closed request in one statement. Returns the ids.
    pub async fn delete_closed(&self) -> Result<Vec<String>, anyhow::Error> {
        let ids: Vec<String> =
            sqlx::query_scalar("DELETE FROM contact_requests WHERE status = ? RETURNING id")
                .bind(ContactStatus::Closed.as_str())
                .fetch_all(&self.conn)
                .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    fn request(name: &str) -> NewContactRequest {
        NewContactRequest {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            subject: "Help".to_string(),
            message: "How do I deposit?".to_string(),
        }
    }

    #[tokio::test]
    async fn reply_closes_and_bulk_delete_removes_closed_only() {
        let repository = ContactRepository::new(database::memory_pool().await);
        let first = repository.insert_request(&request("ana")).await.unwrap();
        let second = repository.insert_request(&request("bob")).await.unwrap();
        repository.insert_request(&request("cid")).await.unwrap();

        let replied = repository
            .reply(&first.id, "Use the deposit form.")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replied.status, ContactStatus::Closed);
        repository.reply(&second.id, "Done.").await.unwrap();

        let deleted = repository.delete_closed().await.unwrap();
        assert_eq!(deleted.len(), 2);

        let remaining = repository.list_requests(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, ContactStatus::Open);
        assert!(repository.reply("missing", "x").await.unwrap().is_none());
    }
}
