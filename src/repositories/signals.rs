use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};

use super::{decimal_column, new_id, parse_column, ReviewError};
use crate::models::signals::{NewSignal, SignalLevels, SignalStatus, TradingSignal};
use crate::models::users::VipTier;

impl<'r> FromRow<'r, SqliteRow> for TradingSignal {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(TradingSignal {
            id: row.try_get("id")?,
            pair: row.try_get("pair")?,
            direction: parse_column(row, "direction")?,
            entry_price: decimal_column(row, "entry_price")?,
            risk_percent: decimal_column(row, "risk_percent")?,
            reward_ratio: decimal_column(row, "reward_ratio")?,
            stop_loss: decimal_column(row, "stop_loss")?,
            take_profit: decimal_column(row, "take_profit")?,
            min_tier: parse_column(row, "min_tier")?,
            notes: row.try_get("notes")?,
            status: parse_column(row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct SignalRepository {
    conn: SqlitePool,
}

impl SignalRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_signal(
        &self,
        signal: &NewSignal,
        levels: SignalLevels,
    ) -> Result<TradingSignal, anyhow::Error> {
        let now = Utc::now();

        let signal = sqlx::query_as::<_, TradingSignal>(
            r#"
                INSERT INTO trading_signals
                (id, pair, direction, entry_price, risk_percent, reward_ratio, stop_loss,
                 take_profit, min_tier, notes, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(signal.pair.trim().to_uppercase())
        .bind(signal.direction.as_str())
        .bind(signal.entry_price.normalize().to_string())
        .bind(signal.risk_percent.normalize().to_string())
        .bind(signal.reward_ratio.normalize().to_string())
        .bind(levels.stop_loss.to_string())
        .bind(levels.take_profit.to_string())
        .bind(signal.min_tier.unwrap_or(VipTier::None).as_str())
        .bind(signal.notes.as_deref())
        .bind(SignalStatus::Activa.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(signal)
    }

    pub async fn list_signals(
        &self,
        status: Option<SignalStatus>,
    ) -> Result<Vec<TradingSignal>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM trading_signals");
        if let Some(status) = status {
            query.push(" WHERE status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let signals = query
            .build_query_as::<TradingSignal>()
            .fetch_all(&self.conn)
            .await?;
        Ok(signals)
    }

    /// Only an `Activa` signal can be closed.
    pub async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
    ) -> Result<TradingSignal, ReviewError> {
        let updated = sqlx::query_as::<_, TradingSignal>(
            r#"
                UPDATE trading_signals SET status = ?, updated_at = ?
                WHERE id = ? AND status = ?
                RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(SignalStatus::Activa.as_str())
        .fetch_optional(&self.conn)
        .await?;

        if let Some(signal) = updated {
            return Ok(signal);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM trading_signals WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.conn)
                .await?;

        match current {
            Some(status) => Err(ReviewError::InvalidTransition {
                id: id.to_string(),
                status,
            }),
            None => Err(ReviewError::NotFound(id.to_string())),
        }
    }

    pub async fn delete_signal(&self, id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM trading_signals WHERE id = ?")
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
    use crate::models::signals::Direction;

    fn new_signal(min_tier: Option<VipTier>) -> NewSignal {
        NewSignal {
            pair: "ethusdt".to_string(),
            direction: Direction::Buy,
            entry_price: "2000".parse().unwrap(),
            risk_percent: "1".parse().unwrap(),
            reward_ratio: "2".parse().unwrap(),
            min_tier,
            notes: None,
        }
    }

    #[tokio::test]
    async fn stores_frozen_levels() {
        let repository = SignalRepository::new(database::memory_pool().await);
        let input = new_signal(Some(VipTier::Gold));
        let signal = repository
            .insert_signal(&input, input.levels().unwrap())
            .await
            .unwrap();

        assert_eq!(signal.pair, "ETHUSDT");
        assert_eq!(signal.stop_loss.to_string(), "1980");
        assert_eq!(signal.take_profit.to_string(), "2040");
        assert_eq!(signal.min_tier, VipTier::Gold);
        assert_eq!(signal.status, SignalStatus::Activa);
    }

    #[tokio::test]
    async fn closed_signals_cannot_change_again() {
        let repository = SignalRepository::new(database::memory_pool().await);
        let input = new_signal(None);
        let signal = repository
            .insert_signal(&input, input.levels().unwrap())
            .await
            .unwrap();

        let closed = repository
            .update_status(&signal.id, SignalStatus::Completada)
            .await
            .unwrap();
        assert_eq!(closed.status, SignalStatus::Completada);

        assert!(matches!(
            repository.update_status(&signal.id, SignalStatus::Fallida).await,
            Err(ReviewError::InvalidTransition { .. })
        ));
        assert!(matches!(
            repository.update_status("missing", SignalStatus::Fallida).await,
            Err(ReviewError::NotFound(_))
        ));

        let completed = repository
            .list_signals(Some(SignalStatus::Completada))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
    }
}
