use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Users,
    Ledger,
    Deposits,
    Withdrawals,
    TradingSignals,
    VipPlans,
    News,
    SiteUpdates,
    SiteSettings,
    ContactRequests,
    Chat,
    AnalyticsLogs,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Ledger => "ledger",
            Collection::Deposits => "deposits",
            Collection::Withdrawals => "withdrawals",
            Collection::TradingSignals => "tradingSignals",
            Collection::VipPlans => "vipPlans",
            Collection::News => "news",
            Collection::SiteUpdates => "siteUpdates",
            Collection::SiteSettings => "siteSettings",
            Collection::ContactRequests => "contactRequests",
            Collection::Chat => "chat",
            Collection::AnalyticsLogs => "analyticsLogs",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub collection: Collection,
    pub document_id: String,
    pub kind: ChangeKind,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FeedFilter {
    pub collection: Option<Collection>,
}
