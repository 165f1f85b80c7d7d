use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::currency::Currency;
use super::ParseEnumError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Membership level. Variants are declared in ascending order so the
/// derived `Ord` ranks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum VipTier {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "vip-standard")]
    Standard,
    #[serde(rename = "vip-gold")]
    Gold,
    #[serde(rename = "vip-diamond")]
    Diamond,
}

impl VipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VipTier::None => "none",
            VipTier::Standard => "vip-standard",
            VipTier::Gold => "vip-gold",
            VipTier::Diamond => "vip-diamond",
        }
    }
}

impl FromStr for VipTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(VipTier::None),
            "vip-standard" => Ok(VipTier::Standard),
            "vip-gold" => Ok(VipTier::Gold),
            "vip-diamond" => Ok(VipTier::Diamond),
            _ => Err(ParseEnumError::new("vip tier", s)),
        }
    }
}

impl fmt::Display for VipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-currency balances. Serialized as one `balance*` field per currency,
/// with missing currencies reported as zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Balances(pub BTreeMap<Currency, Decimal>);

impl Balances {
    pub fn get(&self, currency: Currency) -> Decimal {
        self.0.get(&currency).copied().unwrap_or(Decimal::ZERO)
    }
}

impl Serialize for Balances {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Currency::ALL.len()))?;
        for currency in Currency::ALL {
            map.serialize_entry(currency.field_name(), &self.get(currency))?;
        }
        map.end()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub vip_status: VipTier,
    pub vip_expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub balances: Balances,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Stored tier, or `None` once the expiry has passed.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> VipTier {
        match self.vip_expires_at {
            Some(expires_at) if expires_at <= now => VipTier::None,
            _ => self.vip_status,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Identity issued by the auth provider. Generated when absent.
    pub id: Option<String>,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub role: Option<Role>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(tier: VipTier, expires_at: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            display_name: "U1".to_string(),
            role: Role::User,
            vip_status: tier,
            vip_expires_at: expires_at,
            balances: Balances::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn balances_serialize_as_document_fields() {
        let mut user = user(VipTier::None, None);
        user.balances
            .0
            .insert(Currency::Btc, Decimal::new(15, 1));

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["balanceBTC"], "1.5");
        assert_eq!(json["balanceUSDTFiat"], "0");
        assert_eq!(json["vipStatus"], "none");
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn expired_tier_is_not_effective() {
        let now = Utc::now();
        let expired = user(VipTier::Gold, Some(now - Duration::days(1)));
        let active = user(VipTier::Gold, Some(now + Duration::days(1)));
        let open_ended = user(VipTier::Diamond, None);

        assert_eq!(expired.effective_tier(now), VipTier::None);
        assert_eq!(active.effective_tier(now), VipTier::Gold);
        assert_eq!(open_ended.effective_tier(now), VipTier::Diamond);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(VipTier::None < VipTier::Standard);
        assert!(VipTier::Gold < VipTier::Diamond);
    }
}
