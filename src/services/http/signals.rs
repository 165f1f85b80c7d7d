use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use super::{AdminCaller, AppState, Caller};
use crate::models::signals::{NewSignal, SignalFilter, SignalStatusUpdate, TradingSignal};
use crate::services::signals::SignalRequest;
use crate::services::{call, ServiceError};

const SERVICE: &str = "Signals";

pub async fn visible_signals(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<Vec<TradingSignal>>, ServiceError> {
    let tier = user.effective_tier(Utc::now());

    let signals = call(&state.channels.signals, SERVICE, |response| {
        SignalRequest::ListVisibleSignals { tier, response }
    })
    .await?;

    Ok(Json(signals))
}

pub async fn list_signals(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(filter): Query<SignalFilter>,
) -> Result<Json<Vec<TradingSignal>>, ServiceError> {
    let signals = call(&state.channels.signals, SERVICE, |response| {
        SignalRequest::ListSignals {
            status: filter.status,
            response,
        }
    })
    .await?;

    Ok(Json(signals))
}

pub async fn create_signal(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(signal): Json<NewSignal>,
) -> Result<(StatusCode, Json<TradingSignal>), ServiceError> {
    let signal = call(&state.channels.signals, SERVICE, |response| {
        SignalRequest::CreateSignal { signal, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(signal)))
}

pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
    Json(update): Json<SignalStatusUpdate>,
) -> Result<Json<TradingSignal>, ServiceError> {
    let signal = call(&state.channels.signals, SERVICE, |response| {
        SignalRequest::UpdateSignalStatus {
            id,
            status: update.status,
            response,
        }
    })
    .await?;

    Ok(Json(signal))
}

pub async fn delete_signal(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    call(&state.channels.signals, SERVICE, |response| {
        SignalRequest::DeleteSignal { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
