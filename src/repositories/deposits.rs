use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use super::ledger;
use super::{decimal_column, new_id, parse_column, ReviewError};
use crate::models::ledger::{BalanceAdjustment, BalanceOperation, LedgerEntry};
use crate::models::transfers::{Deposit, DepositStatus, NewDeposit};
use crate::models::users::User;

impl<'r> FromRow<'r, SqliteRow> for Deposit {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Deposit {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            user_email: row.try_get("user_email")?,
            amount: decimal_column(row, "amount")?,
            currency: parse_column(row, "currency")?,
            method: row.try_get("method")?,
            proof_url: row.try_get("proof_url")?,
            status: parse_column(row, "status")?,
            admin_note: row.try_get("admin_note")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct DepositRepository {
    conn: SqlitePool,
}

impl DepositRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_deposit(
        &self,
        user: &User,
        deposit: &NewDeposit,
    ) -> Result<Deposit, anyhow::Error> {
        let now = Utc::now();

        let deposit = sqlx::query_as::<_, Deposit>(
            r#"
                INSERT INTO deposits
                (id, user_id, user_email, amount, currency, method, proof_url, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&user.id)
        .bind(&user.email)
        .bind(deposit.amount.normalize().to_string())
        .bind(deposit.currency.code())
        .bind(&deposit.method)
        .bind(deposit.proof_url.as_deref())
        .bind(DepositStatus::Pendiente.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(deposit)
    }

    pub async fn get_deposit(&self, id: &str) -> Result<Option<Deposit>, anyhow::Error> {
        let deposit = sqlx::query_as::<_, Deposit>("SELECT * FROM deposits WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(deposit)
    }

    pub async fn list_deposits(
        &self,
        status: Option<DepositStatus>,
        user_id: Option<&str>,
    ) -> Result<Vec<Deposit>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM deposits WHERE 1 = 1");
        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = user_id {
            query.push(" AND user_id = ").push_bind(user_id.to_string());
        }
        query.push(" ORDER BY created_at DESC");

        let deposits = query.build_query_as::<Deposit>().fetch_all(&self.conn).await?;
        Ok(deposits)
    }

    /// Moves a pending deposit to `Aprobado` and credits the user in the same
    /// transaction.
    pub async fn approve_deposit(
        &self,
        id: &str,
        note: Option<&str>,
    ) -> Result<(Deposit, LedgerEntry), ReviewError> {
        let mut tx = self.conn.begin().await?;

        let deposit = review(&mut tx, id, DepositStatus::Aprobado, note).await?;
        let entry = ledger::apply(
            &mut tx,
            &deposit.user_id,
            &BalanceAdjustment {
                currency: deposit.currency,
                amount: deposit.amount,
                operation: BalanceOperation::Add,
                reason: Some("Deposit approved".to_string()),
            },
            Some(&deposit.id),
        )
        .await?;

        tx.commit().await?;
        Ok((deposit, entry))
    }

    pub async fn reject_deposit(
        &self,
        id: &str,
        note: Option<&str>,
    ) -> Result<Deposit, ReviewError> {
        let mut tx = self.conn.begin().await?;
        let deposit = review(&mut tx, id, DepositStatus::Rechazado, note).await?;
        tx.commit().await?;

        Ok(deposit)
    }
}

async fn review(
    conn: &mut SqliteConnection,
    id: &str,
    status: DepositStatus,
    note: Option<&str>,
) -> Result<Deposit, ReviewError> {
    let updated = sqlx::query_as::<_, Deposit>(
        r#"
            UPDATE deposits
            SET status = ?, admin_note = COALESCE(?, admin_note), updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING *
        "#,
    )
    .bind(status.as_str())
    .bind(note)
    .bind(Utc::now())
    .bind(id)
    .bind(DepositStatus::Pendiente.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(deposit) = updated {
        return Ok(deposit);
    }

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM deposits WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match current {
        Some(status) => Err(ReviewError::InvalidTransition {
            id: id.to_string(),
            status,
        }),
        None => Err(ReviewError::NotFound(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::currency::Currency;
    use crate::models::users::NewUser;
    use crate::repositories::users::UserRepository;
    use rust_decimal::Decimal;

    async fn setup() -> (DepositRepository, User, SqlitePool) {
        let pool = database::memory_pool().await;
        let user = UserRepository::new(pool.clone())
            .insert_user(&NewUser {
                id: None,
                email: "dep@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        (DepositRepository::new(pool.clone()), user, pool)
    }

    fn new_deposit(amount: &str) -> NewDeposit {
        NewDeposit {
            amount: amount.parse().unwrap(),
            currency: Currency::Ltc,
            method: "crypto".to_string(),
            proof_url: Some("https://files.example.com/proof.png".to_string()),
        }
    }

    #[tokio::test]
    async fn approval_credits_exactly_once() {
        let (repository, user, pool) = setup().await;
        let deposit = repository.insert_deposit(&user, &new_deposit("2.5")).await.unwrap();
        assert_eq!(deposit.status, DepositStatus::Pendiente);

        let (approved, entry) = repository
            .approve_deposit(&deposit.id, Some("ok"))
            .await
            .unwrap();
        assert_eq!(approved.status, DepositStatus::Aprobado);
        assert_eq!(approved.admin_note.as_deref(), Some("ok"));
        assert_eq!(entry.reference.as_deref(), Some(deposit.id.as_str()));

        let again = repository.approve_deposit(&deposit.id, None).await;
        assert!(matches!(again, Err(ReviewError::InvalidTransition { .. })));

        let mut conn = pool.acquire().await.unwrap();
        let balance = ledger::balance(&mut conn, &user.id, Currency::Ltc).await.unwrap();
        assert_eq!(balance, "2.5".parse::<Decimal>().unwrap());
    }

    #[tokio::test]
    async fn rejection_leaves_balance_untouched() {
        let (repository, user, pool) = setup().await;
        let deposit = repository.insert_deposit(&user, &new_deposit("7")).await.unwrap();

        let rejected = repository.reject_deposit(&deposit.id, None).await.unwrap();
        assert_eq!(rejected.status, DepositStatus::Rechazado);
        assert!(matches!(
            repository.approve_deposit(&deposit.id, None).await,
            Err(ReviewError::InvalidTransition { .. })
        ));

        let mut conn = pool.acquire().await.unwrap();
        let balance = ledger::balance(&mut conn, &user.id, Currency::Ltc).await.unwrap();
        assert!(balance.is_zero());
    }

    #[tokio::test]
    async fn unknown_deposit_is_not_found() {
        let (repository, _, _) = setup().await;

        let result = repository.reject_deposit("missing", None).await;
        assert!(matches!(result, Err(ReviewError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (repository, user, _) = setup().await;
        let first = repository.insert_deposit(&user, &new_deposit("1")).await.unwrap();
        repository.insert_deposit(&user, &new_deposit("2")).await.unwrap();
        repository.reject_deposit(&first.id, None).await.unwrap();

        let pending = repository
            .list_deposits(Some(DepositStatus::Pendiente), Some(&user.id))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(repository.list_deposits(None, None).await.unwrap().len(), 2);
    }
}
