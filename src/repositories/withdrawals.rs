use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use super::ledger;
use super::{decimal_column, new_id, parse_column, ReviewError};
use crate::models::ledger::{BalanceAdjustment, BalanceOperation, LedgerEntry};
use crate::models::transfers::{NewWithdrawal, Withdrawal, WithdrawalStatus};
use crate::models::users::User;

impl<'r> FromRow<'r, SqliteRow> for Withdrawal {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Withdrawal {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            user_email: row.try_get("user_email")?,
            amount: decimal_column(row, "amount")?,
            currency: parse_column(row, "currency")?,
            destination: row.try_get("destination")?,
            status: parse_column(row, "status")?,
            admin_note: row.try_get("admin_note")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct WithdrawalRepository {
    conn: SqlitePool,
}

impl WithdrawalRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_withdrawal(
        &self,
        user: &User,
        withdrawal: &NewWithdrawal,
    ) -> Result<Withdrawal, anyhow::Error> {
        let now = Utc::now();

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
                INSERT INTO withdrawals
                (id, user_id, user_email, amount, currency, destination, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&user.id)
        .bind(&user.email)
        .bind(withdrawal.amount.normalize().to_string())
        .bind(withdrawal.currency.code())
        .bind(withdrawal.destination.trim())
        .bind(WithdrawalStatus::Pendiente.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(withdrawal)
    }

    pub async fn get_withdrawal(&self, id: &str) -> Result<Option<Withdrawal>, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(withdrawal)
    }

    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        user_id: Option<&str>,
    ) -> Result<Vec<Withdrawal>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM withdrawals WHERE 1 = 1");
        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = user_id {
            query.push(" AND user_id = ").push_bind(user_id.to_string());
        }
        query.push(" ORDER BY created_at DESC");

        let withdrawals = query
            .build_query_as::<Withdrawal>()
            .fetch_all(&self.conn)
            .await?;
        Ok(withdrawals)
    }

    /// Marks a pending withdrawal as paid out and debits the user. Nothing is
    /// written when the balance does not cover the amount.
    pub async fn complete_withdrawal(
        &self,
        id: &str,
        note: Option<&str>,
    ) -> Result<(Withdrawal, LedgerEntry), ReviewError> {
        let mut tx = self.conn.begin().await?;

        let withdrawal = review(&mut tx, id, WithdrawalStatus::Completado, note).await?;
        let entry = ledger::apply(
            &mut tx,
            &withdrawal.user_id,
            &BalanceAdjustment {
                currency: withdrawal.currency,
                amount: withdrawal.amount,
                operation: BalanceOperation::Subtract,
                reason: Some("Withdrawal completed".to_string()),
            },
            Some(&withdrawal.id),
        )
        .await?;

        tx.commit().await?;
        Ok((withdrawal, entry))
    }

    pub async fn reject_withdrawal(
        &self,
        id: &str,
        note: Option<&str>,
    ) -> Result<Withdrawal, ReviewError> {
        let mut tx = self.conn.begin().await?;
        let withdrawal = review(&mut tx, id, WithdrawalStatus::Rechazado, note).await?;
        tx.commit().await?;

        Ok(withdrawal)
    }
}

async fn review(
    conn: &mut SqliteConnection,
    id: &str,
    status: WithdrawalStatus,
    note: Option<&str>,
) -> Result<Withdrawal, ReviewError> {
    let updated = sqlx::query_as::<_, Withdrawal>(
        r#"
            UPDATE withdrawals
            SET status = ?, admin_note = COALESCE(?, admin_note), updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING *
        "#,
    )
    .bind(status.as_str())
    .bind(note)
    .bind(Utc::now())
    .bind(id)
    .bind(WithdrawalStatus::Pendiente.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(withdrawal) = updated {
        return Ok(withdrawal);
    }

    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM withdrawals WHERE id = ?")
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
    use crate::repositories::ledger::{LedgerError, LedgerRepository};
    use crate::repositories::users::UserRepository;
    use rust_decimal::Decimal;

    async fn setup(funds: &str) -> (WithdrawalRepository, LedgerRepository, User) {
        let pool = database::memory_pool().await;
        let user = UserRepository::new(pool.clone())
            .insert_user(&NewUser {
                id: None,
                email: "wd@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        let ledger = LedgerRepository::new(pool.clone());
        ledger
            .adjust(
                &user.id,
                &BalanceAdjustment {
                    currency: Currency::Trx,
                    amount: funds.parse().unwrap(),
                    operation: BalanceOperation::Add,
                    reason: None,
                },
            )
            .await
            .unwrap();

        (WithdrawalRepository::new(pool), ledger, user)
    }

    fn new_withdrawal(amount: &str) -> NewWithdrawal {
        NewWithdrawal {
            amount: amount.parse().unwrap(),
            currency: Currency::Trx,
            destination: "TXYZ123".to_string(),
        }
    }

    #[tokio::test]
    async fn completion_debits_exactly_once() {
        let (repository, ledger, user) = setup("100").await;
        let withdrawal = repository
            .insert_withdrawal(&user, &new_withdrawal("40"))
            .await
            .unwrap();

        let (completed, entry) = repository
            .complete_withdrawal(&withdrawal.id, None)
            .await
            .unwrap();
        assert_eq!(completed.status, WithdrawalStatus::Completado);
        assert_eq!(entry.balance_after, Decimal::from(60));

        assert!(matches!(
            repository.complete_withdrawal(&withdrawal.id, None).await,
            Err(ReviewError::InvalidTransition { .. })
        ));
        assert_eq!(
            ledger.get_balance(&user.id, Currency::Trx).await.unwrap(),
            Decimal::from(60)
        );
    }

    #[tokio::test]
    async fn two_withdrawals_cannot_overdraw() {
        let (repository, ledger, user) = setup("50").await;
        let first = repository
            .insert_withdrawal(&user, &new_withdrawal("30"))
            .await
            .unwrap();
        let second = repository
            .insert_withdrawal(&user, &new_withdrawal("30"))
            .await
            .unwrap();

        repository.complete_withdrawal(&first.id, None).await.unwrap();
        let result = repository.complete_withdrawal(&second.id, None).await;
        assert!(matches!(
            result,
            Err(ReviewError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));

        // The failed completion rolled back its status change.
        let pending = repository
            .list_withdrawals(Some(WithdrawalStatus::Pendiente), None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(
            ledger.get_balance(&user.id, Currency::Trx).await.unwrap(),
            Decimal::from(20)
        );
    }

    #[tokio::test]
    async fn rejection_keeps_funds() {
        let (repository, ledger, user) = setup("10").await;
        let withdrawal = repository
            .insert_withdrawal(&user, &new_withdrawal("5"))
            .await
            .unwrap();

        let rejected = repository
            .reject_withdrawal(&withdrawal.id, Some("wrong address"))
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rechazado);
        assert_eq!(
            ledger.get_balance(&user.id, Currency::Trx).await.unwrap(),
            Decimal::from(10)
        );
    }
}
