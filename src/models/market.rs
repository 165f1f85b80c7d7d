use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
}

#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TradingPair {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PairFilter {
    pub quote: Option<String>,
}
