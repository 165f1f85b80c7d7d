use std::time::Duration;

use anyhow::bail;
use rust_decimal::Decimal;

use crate::models::market::{ExchangeInfo, Ticker, TickerPrice, TradingPair};

/// Public market data REST API. Every call goes to the network; nothing is
/// cached.
#[derive(Clone)]
pub struct MarketRepository {
    base_url: String,
    client: reqwest::Client,
}

impl MarketRepository {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn fetch_pairs(&self, quote: Option<&str>) -> Result<Vec<TradingPair>, anyhow::Error> {
        let info: ExchangeInfo = self
            .client
            .get(format!("{}/api/v3/exchangeInfo", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        log::debug!("Fetched {} symbols from market API.", info.symbols.len());
        Ok(trading_pairs(info, quote))
    }

    pub async fn fetch_price(&self, symbol: &str) -> Result<Ticker, anyhow::Error> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("Invalid symbol: {}", symbol);
        }

        let ticker: TickerPrice = self
            .client
            .get(format!("{}/api/v3/ticker/price", self.base_url))
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = ticker.price.parse::<Decimal>()?;
        Ok(Ticker {
            symbol: ticker.symbol,
            price: price.normalize(),
        })
    }
}

/// Keeps tradable symbols, optionally restricted to one quote asset.
pub fn trading_pairs(info: ExchangeInfo, quote: Option<&str>) -> Vec<TradingPair> {
    let quote = quote.map(|q| q.trim().to_uppercase());

    info.symbols
        .into_iter()
        .filter(|symbol| symbol.status == "TRADING")
        .filter(|symbol| match &quote {
            Some(quote) => &symbol.quote_asset == quote,
            None => true,
        })
        .map(|symbol| TradingPair {
            symbol: symbol.symbol,
            base: symbol.base_asset,
            quote: symbol.quote_asset,
        })
        .collect()
}
