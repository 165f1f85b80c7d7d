use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use super::{decimal_column, new_id, parse_column};
use crate::models::currency::Currency;
use crate::models::users::{Balances, NewUser, User, UserFilter, UserUpdate, VipTier};

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            role: parse_column(row, "role")?,
            vip_status: parse_column(row, "vip_status")?,
            vip_expires_at: row.try_get("vip_expires_at")?,
            balances: Balances::default(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct UserRepository {
    conn: SqlitePool,
}

impl UserRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_user(&self, new_user: &NewUser) -> Result<User, anyhow::Error> {
        let user_id = new_user.id.clone().unwrap_or_else(new_id);
        let display_name = new_user
            .display_name
            .clone()
            .unwrap_or_else(|| new_user.email.clone());
        let now = Utc::now();

        let mut tx = self.conn.begin().await?;

        let mut user = sqlx::query_as::<_, User>(
            r#"
                INSERT INTO users (id, email, display_name, role, vip_status, created_at, updated_at)
                VALUES (?, ?, ?, 'user', 'none', ?, ?)
                RETURNING *
            "#,
        )
        .bind(&user_id)
        .bind(new_user.email.trim())
        .bind(display_name)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for currency in Currency::ALL {
            sqlx::query("INSERT INTO user_balances (user_id, currency, amount) VALUES (?, ?, '0')")
                .bind(&user_id)
                .bind(currency.code())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        user.balances = Balances::default();
        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        Ok(fetch_user(&mut conn, user_id).await?)
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_one(&self.conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE 1 = 1");
        if let Some(role) = filter.role {
            query.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim().to_lowercase());
            query
                .push(" AND (LOWER(email) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(display_name) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY created_at DESC");

        let mut users = query.build_query_as::<User>().fetch_all(&self.conn).await?;

        let rows = sqlx::query("SELECT user_id, currency, amount FROM user_balances")
            .fetch_all(&self.conn)
            .await?;
        let mut balances: HashMap<String, Balances> = HashMap::new();
        for row in rows {
            let user_id: String = row.try_get("user_id")?;
            let currency: Currency = parse_column(&row, "currency")?;
            let amount = decimal_column(&row, "amount")?;
            balances
                .entry(user_id)
                .or_default()
                .0
                .insert(currency, amount);
        }

        for user in users.iter_mut() {
            if let Some(user_balances) = balances.remove(&user.id) {
                user.balances = user_balances;
            }
        }

        Ok(users)
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<Option<User>, anyhow::Error> {
        let result = sqlx::query(
            r#"
                UPDATE users
                SET display_name = COALESCE(?, display_name),
                    role = COALESCE(?, role),
                    updated_at = ?
                WHERE id = ?
            "#,
        )
        .bind(update.display_name.as_deref())
        .bind(update.role.map(|role| role.as_str()))
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user_by_id(user_id).await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clears every tier whose expiry is not after `now`. Returns the
    /// affected user ids.
    pub async fn expire_vip(&self, now: DateTime<Utc>) -> Result<Vec<String>, anyhow::Error> {
        let mut tx = self.conn.begin_with("BEGIN IMMEDIATE").await?;

        let rows = sqlx::query(
            "SELECT id, vip_expires_at FROM users WHERE vip_status != 'none' AND vip_expires_at IS NOT NULL",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut expired = Vec::new();
        for row in rows {
            let expires_at: DateTime<Utc> = row.try_get("vip_expires_at")?;
            if expires_at <= now {
                expired.push(row.try_get::<String, _>("id")?);
            }
        }

        for user_id in &expired {
            set_vip(&mut tx, user_id, VipTier::None, None).await?;
        }

        tx.commit().await?;
        Ok(expired)
    }
}

pub async fn fetch_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match user {
        Some(mut user) => {
            user.balances = super::ledger::balances(conn, user_id).await?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

pub async fn set_vip(
    conn: &mut SqliteConnection,
    user_id: &str,
    tier: VipTier,
    expires_at: Option<DateTime<Utc>>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET vip_status = ?, vip_expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(tier.as_str())
    .bind(expires_at)
    .bind(Utc::now())
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::users::Role;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            id: None,
            email: email.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn signup_starts_with_zero_balances() {
        let repository = UserRepository::new(database::memory_pool().await);

        let user = repository.insert_user(&new_user("ana@example.com")).await.unwrap();
        let stored = repository.get_user_by_id(&user.id).await.unwrap().unwrap();

        assert_eq!(stored.role, Role::User);
        assert_eq!(stored.vip_status, VipTier::None);
        assert_eq!(stored.display_name, "ana@example.com");
        assert_eq!(stored.balances.0.len(), Currency::ALL.len());
        assert!(stored.balances.0.values().all(|amount| amount.is_zero()));
    }

    #[tokio::test]
    async fn list_filters_by_role_and_search() {
        let repository = UserRepository::new(database::memory_pool().await);
        let admin = repository.insert_user(&new_user("boss@example.com")).await.unwrap();
        repository.insert_user(&new_user("carl@example.com")).await.unwrap();
        repository
            .update_user(
                &admin.id,
                &UserUpdate {
                    display_name: None,
                    role: Some(Role::Admin),
                },
            )
            .await
            .unwrap();

        let admins = repository
            .list_users(&UserFilter {
                role: Some(Role::Admin),
                search: None,
            })
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "boss@example.com");

        let found = repository
            .list_users(&UserFilter {
                role: None,
                search: Some("CARL".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].balances.0.len(), Currency::ALL.len());
    }

    #[tokio::test]
    async fn expired_tiers_are_cleared() {
        let pool = database::memory_pool().await;
        let repository = UserRepository::new(pool.clone());
        let lapsed = repository.insert_user(&new_user("old@example.com")).await.unwrap();
        let current = repository.insert_user(&new_user("new@example.com")).await.unwrap();
        let now = Utc::now();

        let mut conn = pool.acquire().await.unwrap();
        set_vip(&mut conn, &lapsed.id, VipTier::Gold, Some(now - Duration::hours(1)))
            .await
            .unwrap();
        set_vip(&mut conn, &current.id, VipTier::Gold, Some(now + Duration::days(3)))
            .await
            .unwrap();
        drop(conn);

        let expired = repository.expire_vip(now).await.unwrap();
        assert_eq!(expired, vec![lapsed.id.clone()]);

        let lapsed = repository.get_user_by_id(&lapsed.id).await.unwrap().unwrap();
        assert_eq!(lapsed.vip_status, VipTier::None);
        assert!(lapsed.vip_expires_at.is_none());
    }

    #[tokio::test]
    async fn deleting_removes_balances() {
        let pool = database::memory_pool().await;
        let repository = UserRepository::new(pool.clone());
        let user = repository.insert_user(&new_user("gone@example.com")).await.unwrap();

        assert!(repository.delete_user(&user.id).await.unwrap());
        assert!(!repository.delete_user(&user.id).await.unwrap());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM user_balances")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
