use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

pub mod analytics;
pub mod chat;
pub mod contacts;
pub mod deposits;
pub mod geolocation;
pub mod ledger;
pub mod market;
pub mod news;
pub mod signals;
pub mod site;
pub mod users;
pub mod vip;
pub mod withdrawals;

pub fn new_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Reads a TEXT column and parses it into `T`.
pub fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    parse_column::<Decimal>(row, column)
}

/// Outcome of a failed status transition on a reviewable document.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Document {id} is already {status}")]
    InvalidTransition { id: String, status: String },
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
