use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::users::VipTier;
use super::ParseEnumError;

const PRICE_SCALE: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            _ => Err(ParseEnumError::new("direction", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum SignalStatus {
    Activa,
    Completada,
    Fallida,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Activa => "Activa",
            SignalStatus::Completada => "Completada",
            SignalStatus::Fallida => "Fallida",
        }
    }
}

impl FromStr for SignalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Activa" => Ok(SignalStatus::Activa),
            "Completada" => Ok(SignalStatus::Completada),
            "Fallida" => Ok(SignalStatus::Fallida),
            _ => Err(ParseEnumError::new("signal status", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSignal {
    pub id: String,
    pub pair: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub risk_percent: Decimal,
    pub reward_ratio: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub min_tier: VipTier,
    pub notes: Option<String>,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignal {
    pub pair: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub risk_percent: Decimal,
    pub reward_ratio: Decimal,
    pub min_tier: Option<VipTier>,
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalLevels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum LevelError {
    #[error("Entry price must be positive")]
    NonPositiveEntry,
    #[error("Risk percent must be between 0 and 100")]
    RiskOutOfRange,
    #[error("Reward ratio must be positive")]
    NonPositiveRatio,
    #[error("Take profit would not be positive")]
    NonPositiveTarget,
    #[error("Price levels are out of range")]
    Overflow,
}

impl NewSignal {
    /// Stop loss sits `risk_percent` away from the entry; take profit sits
    /// `reward_ratio` times that distance on the other side.
    pub fn levels(&self) -> Result<SignalLevels, LevelError> {
        let hundred = Decimal::ONE_HUNDRED;

        if self.entry_price <= Decimal::ZERO {
            return Err(LevelError::NonPositiveEntry);
        }
        if self.risk_percent <= Decimal::ZERO || self.risk_percent >= hundred {
            return Err(LevelError::RiskOutOfRange);
        }
        if self.reward_ratio <= Decimal::ZERO {
            return Err(LevelError::NonPositiveRatio);
        }

        let risk = self
            .entry_price
            .checked_mul(self.risk_percent)
            .and_then(|scaled| scaled.checked_div(hundred))
            .ok_or(LevelError::Overflow)?;
        let reward = risk
            .checked_mul(self.reward_ratio)
            .ok_or(LevelError::Overflow)?;

        let (stop_loss, take_profit) = match self.direction {
            Direction::Buy => (
                self.entry_price.checked_sub(risk),
                self.entry_price.checked_add(reward),
            ),
            Direction::Sell => (
                self.entry_price.checked_add(risk),
                self.entry_price.checked_sub(reward),
            ),
        };
        let (stop_loss, take_profit) = stop_loss.zip(take_profit).ok_or(LevelError::Overflow)?;

        if take_profit <= Decimal::ZERO {
            return Err(LevelError::NonPositiveTarget);
        }

        Ok(SignalLevels {
            stop_loss: stop_loss.round_dp(PRICE_SCALE).normalize(),
            take_profit: take_profit.round_dp(PRICE_SCALE).normalize(),
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SignalStatusUpdate {
    pub status: SignalStatus,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignalFilter {
    pub status: Option<SignalStatus>,
}
