use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::{AdminCaller, AppState, Caller};
use crate::models::transfers::{
    Deposit, NewDeposit, NewWithdrawal, Review, TransferFilter, Withdrawal,
};
use crate::services::transfers::TransferRequest;
use crate::services::{call, ServiceError};

const SERVICE: &str = "Transfers";

pub async fn my_deposits(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(filter): Query<TransferFilter>,
) -> Result<Json<Vec<Deposit>>, ServiceError> {
    let filter = TransferFilter {
        user_id: Some(user.id),
        ..filter
    };

    let deposits = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::ListDeposits { filter, response }
    })
    .await?;

    Ok(Json(deposits))
}

pub async fn create_deposit(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(deposit): Json<NewDeposit>,
) -> Result<(StatusCode, Json<Deposit>), ServiceError> {
    let deposit = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::CreateDeposit {
            user_id: user.id,
            deposit,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(deposit)))
}

pub async fn my_withdrawals(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(filter): Query<TransferFilter>,
) -> Result<Json<Vec<Withdrawal>>, ServiceError> {
    let filter = TransferFilter {
        user_id: Some(user.id),
        ..filter
    };

    let withdrawals = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::ListWithdrawals { filter, response }
    })
    .await?;

    Ok(Json(withdrawals))
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(withdrawal): Json<NewWithdrawal>,
) -> Result<(StatusCode, Json<Withdrawal>), ServiceError> {
    let withdrawal = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::CreateWithdrawal {
            user_id: user.id,
            withdrawal,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub async fn list_deposits(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(filter): Query<TransferFilter>,
) -> Result<Json<Vec<Deposit>>, ServiceError> {
    let deposits = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::ListDeposits { filter, response }
    })
    .await?;

    Ok(Json(deposits))
}

pub async fn approve_deposit(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(review): Json<Review>,
) -> Result<Json<Deposit>, ServiceError> {
    log::info!("Admin {} approving deposit {}", admin.id, id);
    let note = review.note;

    let deposit = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::ApproveDeposit { id, note, response }
    })
    .await?;

    Ok(Json(deposit))
}

pub async fn reject_deposit(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(review): Json<Review>,
) -> Result<Json<Deposit>, ServiceError> {
    log::info!("Admin {} rejecting deposit {}", admin.id, id);
    let note = review.note;

    let deposit = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::RejectDeposit { id, note, response }
    })
    .await?;

    Ok(Json(deposit))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(filter): Query<TransferFilter>,
) -> Result<Json<Vec<Withdrawal>>, ServiceError> {
    let withdrawals = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::ListWithdrawals { filter, response }
    })
    .await?;

    Ok(Json(withdrawals))
}

pub async fn complete_withdrawal(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(review): Json<Review>,
) -> Result<Json<Withdrawal>, ServiceError> {
    log::info!("Admin {} completing withdrawal {}", admin.id, id);
    let note = review.note;

    let withdrawal = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::CompleteWithdrawal { id, note, response }
    })
    .await?;

    Ok(Json(withdrawal))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(review): Json<Review>,
) -> Result<Json<Withdrawal>, ServiceError> {
    log::info!("Admin {} rejecting withdrawal {}", admin.id, id);
    let note = review.note;

    let withdrawal = call(&state.channels.transfers, SERVICE, |response| {
        TransferRequest::RejectWithdrawal { id, note, response }
    })
    .await?;

    Ok(Json(withdrawal))
}
