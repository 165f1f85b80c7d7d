use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row};

use super::new_id;
use crate::models::content::{SiteSettings, SiteSettingsPatch, SiteUpdate, SiteUpdateInput};

impl<'r> FromRow<'r, SqliteRow> for SiteUpdate {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(SiteUpdate {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct SiteRepository {
    conn: SqlitePool,
}

impl SiteRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn get_settings(&self) -> Result<SiteSettings, anyhow::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM site_settings ORDER BY key")
                .fetch_all(&self.conn)
                .await?;

        Ok(SiteSettings(rows.into_iter().collect()))
    }

    /// Merges `patch` into the stored settings; `None` values delete keys.
    pub async fn update_settings(
        &self,
        patch: &SiteSettingsPatch,
    ) -> Result<SiteSettings, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        for (key, value) in patch {
            match value {
                Some(value) => {
                    sqlx::query(
                        r#"
                            INSERT INTO site_settings (key, value) VALUES (?, ?)
                            ON CONFLICT (key) DO UPDATE SET value = excluded.value
                        "#,
                    )
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM site_settings WHERE key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        self.get_settings().await
    }

    pub async fn insert_update(
        &self,
        update: &SiteUpdateInput,
    ) -> Result<SiteUpdate, anyhow::Error> {
        let now = Utc::now();

        let update = sqlx::query_as::<_, SiteUpdate>(
            r#"
                INSERT INTO site_updates (id, title, body, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&update.title)
        .bind(&update.body)
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(update)
    }

    pub async fn update_update(
        &self,
        id: &str,
        update: &SiteUpdateInput,
    ) -> Result<Option<SiteUpdate>, anyhow::Error> {
        let update = sqlx::query_as::<_, SiteUpdate>(
            "UPDATE site_updates SET title = ?, body = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(&update.title)
        .bind(&update.body)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(update)
    }

    pub async fn list_updates(&self) -> Result<Vec<SiteUpdate>, anyhow::Error> {
        let updates =
            sqlx::query_as::<_, SiteUpdate>("SELECT * FROM site_updates ORDER BY created_at DESC")
                .fetch_all(&self.conn)
                .await?;

        Ok(updates)
    }

    pub async fn delete_update(&self, id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM site_updates WHERE id = ?")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
