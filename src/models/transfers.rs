use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::currency::Currency;
use super::ParseEnumError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum DepositStatus {
    Pendiente,
    Aprobado,
    Rechazado,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pendiente => "Pendiente",
            DepositStatus::Aprobado => "Aprobado",
            DepositStatus::Rechazado => "Rechazado",
        }
    }
}

impl FromStr for DepositStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pendiente" => Ok(DepositStatus::Pendiente),
            "Aprobado" => Ok(DepositStatus::Aprobado),
            "Rechazado" => Ok(DepositStatus::Rechazado),
            _ => Err(ParseEnumError::new("deposit status", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum WithdrawalStatus {
    Pendiente,
    Completado,
    Rechazado,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pendiente => "Pendiente",
            WithdrawalStatus::Completado => "Completado",
            WithdrawalStatus::Rechazado => "Rechazado",
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pendiente" => Ok(WithdrawalStatus::Pendiente),
            "Completado" => Ok(WithdrawalStatus::Completado),
            "Rechazado" => Ok(WithdrawalStatus::Rechazado),
            _ => Err(ParseEnumError::new("withdrawal status", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: String,
    pub proof_url: Option<String>,
    pub status: DepositStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeposit {
    pub amount: Decimal,
    pub currency: Currency,
    pub method: String,
    pub proof_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub destination: String,
    pub status: WithdrawalStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWithdrawal {
    pub amount: Decimal,
    pub currency: Currency,
    pub destination: String,
}

/// Admin decision body shared by every approve/reject route.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Review {
    pub note: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransferFilter {
    pub status: Option<String>,
    pub user_id: Option<String>,
}
