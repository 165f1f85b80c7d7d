use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::currency::Currency;
use super::ParseEnumError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceOperation {
    Add,
    Subtract,
    Reset,
}

impl BalanceOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceOperation::Add => "add",
            BalanceOperation::Subtract => "subtract",
            BalanceOperation::Reset => "reset",
        }
    }
}

impl FromStr for BalanceOperation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(BalanceOperation::Add),
            "subtract" => Ok(BalanceOperation::Subtract),
            "reset" => Ok(BalanceOperation::Reset),
            _ => Err(ParseEnumError::new("balance operation", s)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAdjustment {
    pub currency: Currency,
    #[serde(default)]
    pub amount: Decimal,
    pub operation: BalanceOperation,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub currency: Currency,
    pub operation: BalanceOperation,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}
