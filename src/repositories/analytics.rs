use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row};

use super::new_id;
use crate::models::analytics::VisitLog;

impl<'r> FromRow<'r, SqliteRow> for VisitLog {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(VisitLog {
            id: row.try_get("id")?,
            path: row.try_get("path")?,
            user_id: row.try_get("user_id")?,
            ip_hash: row.try_get("ip_hash")?,
            country: row.try_get("country")?,
            city: row.try_get("city")?,
            user_agent: row.try_get("user_agent")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct AnalyticsRepository {
    conn: SqlitePool,
}

pub struct VisitRecord<'a> {
    pub path: &'a str,
    pub user_id: Option<&'a str>,
    pub ip_hash: Option<&'a str>,
    pub country: &'a str,
    pub city: &'a str,
    pub user_agent: Option<&'a str>,
}

impl AnalyticsRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_visit(&self, visit: &VisitRecord<'_>) -> Result<VisitLog, anyhow::Error> {
        let log = sqlx::query_as::<_, VisitLog>(
            r#"
                INSERT INTO analytics_logs (id, path, user_id, ip_hash, country, city, user_agent, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(visit.path)
        .bind(visit.user_id)
        .bind(visit.ip_hash)
        .bind(visit.country)
        .bind(visit.city)
        .bind(visit.user_agent)
        .bind(Utc::now())
        .fetch_one(&self.conn)
        .await?;

        Ok(log)
    }

    pub async fn list_visits(&self, limit: i64) -> Result<Vec<VisitLog>, anyhow::Error> {
        let logs = sqlx::query_as::<_, VisitLog>(
            "SELECT * FROM analytics_logs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(logs)
    }
}
