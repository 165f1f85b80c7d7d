use async_trait::async_trait;

use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::market::{Ticker, TradingPair};
use crate::repositories::market::MarketRepository;

pub enum MarketRequest {
    ListPairs {
        quote: Option<String>,
        response: Reply<Vec<TradingPair>>,
    },
    GetPrice {
        symbol: String,
        response: Reply<Ticker>,
    },
}

#[derive(Clone)]
pub struct MarketRequestHandler {
    repository: MarketRepository,
}

impl MarketRequestHandler {
    pub fn new(repository: MarketRepository) -> Self {
        Self { repository }
    }

    async fn list_pairs(&self, quote: Option<&str>) -> Result<Vec<TradingPair>, ServiceError> {
        self.repository.fetch_pairs(quote).await.map_err(|e| {
            ServiceError::ExternalService(
                "Market".to_string(),
                "exchangeInfo".to_string(),
                e.to_string(),
            )
        })
    }

    async fn get_price(&self, symbol: &str) -> Result<Ticker, ServiceError> {
        if symbol.trim().is_empty() || !symbol.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ServiceError::Validation(format!("invalid symbol: {}", symbol)));
        }

        self.repository.fetch_price(symbol).await.map_err(|e| {
            ServiceError::ExternalService(
                "Market".to_string(),
                format!("ticker/price {}", symbol),
                e.to_string(),
            )
        })
    }
}

#[async_trait]
impl RequestHandler<MarketRequest> for MarketRequestHandler {
    async fn handle_request(&self, request: MarketRequest) {
        match request {
            MarketRequest::ListPairs { quote, response } => {
                let pairs = self.list_pairs(quote.as_deref()).await;
                if let Err(e) = &pairs {
                    log::error!("{}", e);
                }
                let _ = response.send(pairs);
            }
            MarketRequest::GetPrice { symbol, response } => {
                let price = self.get_price(&symbol).await;
                if let Err(e) = &price {
                    log::error!("{}", e);
                }
                let _ = response.send(price);
            }
        }
    }
}

pub struct MarketService;

impl MarketService {
    pub fn new() -> Self {
        MarketService {}
    }
}

#[async_trait]
impl Service<MarketRequest, MarketRequestHandler> for MarketService {}
