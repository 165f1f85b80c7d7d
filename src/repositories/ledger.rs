use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row, SqliteConnection};

use super::{decimal_column, new_id, parse_column};
use crate::models::currency::Currency;
use crate::models::ledger::{BalanceAdjustment, BalanceOperation, LedgerEntry};
use crate::models::users::Balances;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("User not found: {0}")]
    UnknownUser(String),
    #[error("Amount must not be negative: {0}")]
    InvalidAmount(Decimal),
    #[error("{currency} balance would overflow: current {current}, adding {amount}")]
    Overflow {
        currency: Currency,
        current: Decimal,
        amount: Decimal,
    },
    #[error("Insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientFunds {
        currency: Currency,
        available: Decimal,
        requested: Decimal,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl<'r> FromRow<'r, SqliteRow> for LedgerEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerEntry {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            currency: parse_column(row, "currency")?,
            operation: parse_column(row, "operation")?,
            amount: decimal_column(row, "amount")?,
            balance_before: decimal_column(row, "balance_before")?,
            balance_after: decimal_column(row, "balance_after")?,
            reason: row.try_get("reason")?,
            reference: row.try_get("reference")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Applies one balance mutation on `conn`, which is expected to be inside
/// a transaction owned by the caller. The stored value is read here, never
/// taken from the caller, and the result can never go below zero.
pub async fn apply(
    conn: &mut SqliteConnection,
    user_id: &str,
    adjustment: &BalanceAdjustment,
    reference: Option<&str>,
) -> Result<LedgerEntry, LedgerError> {
    if adjustment.amount.is_sign_negative() && !adjustment.amount.is_zero() {
        return Err(LedgerError::InvalidAmount(adjustment.amount));
    }

    let now = Utc::now();

    // Writing first takes the database write lock before anything is read.
    let touched = sqlx::query("UPDATE users SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(LedgerError::UnknownUser(user_id.to_string()));
    }

    let currency = adjustment.currency;
    sqlx::query(
        "INSERT INTO user_balances (user_id, currency, amount) VALUES (?, ?, '0') ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(currency.code())
    .execute(&mut *conn)
    .await?;

    let current = balance(conn, user_id, currency).await?;

    let (amount, next) = match adjustment.operation {
        BalanceOperation::Add => {
            let next = current
                .checked_add(adjustment.amount)
                .ok_or(LedgerError::Overflow {
                    currency,
                    current,
                    amount: adjustment.amount,
                })?;
            (adjustment.amount, next)
        }
        BalanceOperation::Subtract => match current.checked_sub(adjustment.amount) {
            Some(next) if adjustment.amount <= current => (adjustment.amount, next),
            _ => {
                return Err(LedgerError::InsufficientFunds {
                    currency,
                    available: current,
                    requested: adjustment.amount,
                })
            }
        },
        BalanceOperation::Reset => (current, Decimal::ZERO),
    };

    sqlx::query("UPDATE user_balances SET amount = ? WHERE user_id = ? AND currency = ?")
        .bind(next.normalize().to_string())
        .bind(user_id)
        .bind(currency.code())
        .execute(&mut *conn)
        .await?;

    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
            INSERT INTO ledger_entries
            (id, user_id, currency, operation, amount, balance_before, balance_after, reason, reference, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(currency.code())
    .bind(adjustment.operation.as_str())
    .bind(amount.normalize().to_string())
    .bind(current.normalize().to_string())
    .bind(next.normalize().to_string())
    .bind(adjustment.reason.as_deref())
    .bind(reference)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(entry)
}

pub async fn balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    currency: Currency,
) -> Result<Decimal, sqlx::Error> {
    let amount: Option<String> =
        sqlx::query_scalar("SELECT amount FROM user_balances WHERE user_id = ? AND currency = ?")
            .bind(user_id)
            .bind(currency.code())
            .fetch_optional(conn)
            .await?;

    match amount {
        Some(amount) => amount.parse::<Decimal>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "amount".to_string(),
            source: Box::new(e),
        }),
        None => Ok(Decimal::ZERO),
    }
}

pub async fn balances(conn: &mut SqliteConnection, user_id: &str) -> Result<Balances, sqlx::Error> {
    let rows = sqlx::query("SELECT currency, amount FROM user_balances WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(conn)
        .await?;

    let mut balances = Balances::default();
    for row in rows {
        let currency: Currency = parse_column(&row, "currency")?;
        balances.0.insert(currency, decimal_column(&row, "amount")?);
    }

    Ok(balances)
}

#[derive(Clone)]
pub struct LedgerRepository {
    conn: SqlitePool,
}

impl LedgerRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn adjust(
        &self,
        user_id: &str,
        adjustment: &BalanceAdjustment,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut tx = self.conn.begin().await?;
        let entry = apply(&mut tx, user_id, adjustment, None).await?;
        tx.commit().await?;

        Ok(entry)
    }

    pub async fn get_balances(&self, user_id: &str) -> Result<Balances, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        Ok(balances(&mut conn, user_id).await?)
    }

    pub async fn get_balance(
        &self,
        user_id: &str,
        currency: Currency,
    ) -> Result<Decimal, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        Ok(balance(&mut conn, user_id, currency).await?)
    }

    pub async fn list_entries(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, anyhow::Error> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(entries)
    }
}
