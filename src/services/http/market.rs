use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::AppState;
use crate::models::market::{PairFilter, Ticker, TradingPair};
use crate::services::market::MarketRequest;
use crate::services::{call, ServiceError};

pub async fn list_pairs(
    State(state): State<AppState>,
    Query(filter): Query<PairFilter>,
) -> Result<Json<Vec<TradingPair>>, ServiceError> {
    let pairs = call(&state.channels.market, "Market", |response| {
        MarketRequest::ListPairs {
            quote: filter.quote,
            response,
        }
    })
    .await?;

    Ok(Json(pairs))
}

pub async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Ticker>, ServiceError> {
    let ticker = call(&state.channels.market, "Market", |response| {
        MarketRequest::GetPrice { symbol, response }
    })
    .await?;

    Ok(Json(ticker))
}
