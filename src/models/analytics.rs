use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitLog {
    pub id: String,
    pub path: String,
    pub user_id: Option<String>,
    pub ip_hash: Option<String>,
    pub country: String,
    pub city: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisit {
    pub path: String,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Location {
    #[serde(rename = "country_name")]
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListLimit {
    pub limit: Option<i64>,
}
