use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::users::VipTier;
use super::ParseEnumError;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub image_url: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsInput {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub body: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUpdate {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SiteUpdateInput {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VipPlan {
    pub id: String,
    pub tier: VipTier,
    pub name: String,
    pub price: Decimal,
    pub duration_days: i64,
    pub features: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipPlanInput {
    pub tier: VipTier,
    pub name: String,
    pub price: Decimal,
    pub duration_days: i64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipGrant {
    pub tier: VipTier,
    pub days: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipPurchase {
    pub plan_id: String,
}

/// Free-form key/value configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SiteSettings(pub BTreeMap<String, String>);

impl SiteSettings {
    pub const FEATURE_PREFIX: &'static str = "feature_";
    pub const AD_PREFIX: &'static str = "ad_";

    /// Toggles default to on; only an explicit `false` disables one.
    pub fn feature_enabled(&self, feature: &str) -> bool {
        let key = format!("{}{}", Self::FEATURE_PREFIX, feature);
        self.0
            .get(&key)
            .map(|value| !value.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true)
    }

    pub fn features(&self) -> BTreeMap<String, bool> {
        self.0
            .keys()
            .filter_map(|key| key.strip_prefix(Self::FEATURE_PREFIX))
            .map(|feature| (feature.to_string(), self.feature_enabled(feature)))
            .collect()
    }
}

/// `null` values remove the key.
pub type SiteSettingsPatch = BTreeMap<String, Option<String>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Open,
    Closed,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Open => "open",
            ContactStatus::Closed => "closed",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ContactStatus::Open),
            "closed" => Ok(ContactStatus::Closed),
            _ => Err(ParseEnumError::new("contact status", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub reply: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContactReply {
    pub reply: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContactFilter {
    pub status: Option<ContactStatus>,
}
