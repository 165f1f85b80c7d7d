use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};

use super::new_id;
use crate::models::content::{NewsArticle, NewsInput};

impl<'r> FromRow<'r, SqliteRow> for NewsArticle {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(NewsArticle {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            summary: row.try_get("summary")?,
            body: row.try_get("body")?,
            image_url: row.try_get("image_url")?,
            published: row.try_get("published")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct NewsRepository {
    conn: SqlitePool,
}

impl NewsRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_article(&self, article: &NewsInput) -> Result<NewsArticle, anyhow::Error> {
        let now = Utc::now();

        let article = sqlx::query_as::<_, NewsArticle>(
            r#"
                INSERT INTO news (id, title, summary, body, image_url, published, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.body)
        .bind(article.image_url.as_deref())
        .bind(article.published)
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(article)
    }

    pub async fn update_article(
        &self,
        id: &str,
        article: &NewsInput,
    ) -> Result<Option<NewsArticle>, anyhow::Error> {
        let article = sqlx::query_as::<_, NewsArticle>(
            r#"
                UPDATE news
                SET title = ?, summary = ?, body = ?, image_url = ?, published = ?, updated_at = ?
                WHERE id = ?
                RETURNING *
            "#,
        )
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.body)
        .bind(article.image_url.as_deref())
        .bind(article.published)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(article)
    }

    pub async fn list_articles(
        &self,
        published_only: bool,
    ) -> Result<Vec<NewsArticle>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM news");
        if published_only {
            query.push(" WHERE published = 1");
        }
        query.push(" ORDER BY created_at DESC");

        let articles = query
            .build_query_as::<NewsArticle>()
            .fetch_all(&self.conn)
            .await?;
        Ok(articles)
    }

    pub async fn delete_article(&self, id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM news WHERE id = ?")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    fn article(title: &str, published: bool) -> NewsInput {
        NewsInput {
            title: title.to_string(),
            summary: String::new(),
            body: "Body".to_string(),
            image_url: None,
            published,
        }
    }

    #[tokio::test]
    async fn drafts_are_hidden_from_the_public_list() {
        let repository = NewsRepository::new(database::memory_pool().await);
        let draft = repository.insert_article(&article("Draft", false)).await.unwrap();
        repository.insert_article(&article("Live", true)).await.unwrap();

        assert_eq!(repository.list_articles(true).await.unwrap().len(), 1);
        assert_eq!(repository.list_articles(false).await.unwrap().len(), 2);

        let published = repository
            .update_article(&draft.id, &article("Draft", true))
            .await
            .unwrap()
            .unwrap();
        assert!(published.published);
        assert_eq!(repository.list_articles(true).await.unwrap().len(), 2);

        assert!(repository.delete_article(&draft.id).await.unwrap());
        assert!(repository
            .update_article(&draft.id, &article("Gone", true))
            .await
            .unwrap()
            .is_none());
    }
}
