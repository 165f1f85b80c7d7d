use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use super::{AdminCaller, AppState, Caller, USER_ID_HEADER};
use crate::models::analytics::ListLimit;
use crate::models::ledger::{BalanceAdjustment, LedgerEntry};
use crate::models::users::{NewUser, User, UserFilter, UserUpdate, VipTier};
use crate::services::content::ContentRequest;
use crate::services::ledger::LedgerRequest;
use crate::services::users::UserRequest;
use crate::services::{call, ServiceError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    user: User,
    effective_tier: VipTier,
    features: BTreeMap<String, bool>,
}

/// Signup. The forwarded identity, when present, becomes the account id.
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut new_user): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ServiceError> {
    if let Some(id) = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
    {
        new_user.id = Some(id.trim().to_string());
    }

    let user = call(&state.channels.users, "Users", |response| {
        UserRequest::CreateUser { new_user, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn me(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<Profile>, ServiceError> {
    let settings = call(&state.channels.content, "Content", |response| {
        ContentRequest::GetSettings { response }
    })
    .await?;

    Ok(Json(Profile {
        effective_tier: user.effective_tier(Utc::now()),
        features: settings.features(),
        user,
    }))
}

pub async fn my_ledger(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(query): Query<ListLimit>,
) -> Result<Json<Vec<LedgerEntry>>, ServiceError> {
    ledger(&state, user.id, query.limit).await
}

pub async fn user_ledger(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
    Query(query): Query<ListLimit>,
) -> Result<Json<Vec<LedgerEntry>>, ServiceError> {
    ledger(&state, id, query.limit).await
}

async fn ledger(
    state: &AppState,
    user_id: String,
    limit: Option<i64>,
) -> Result<Json<Vec<LedgerEntry>>, ServiceError> {
    let entries = call(&state.channels.ledger, "Ledger", |response| {
        LedgerRequest::ListEntries {
            user_id,
            limit,
            response,
        }
    })
    .await?;

    Ok(Json(entries))
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>, ServiceError> {
    let users = call(&state.channels.users, "Users", |response| {
        UserRequest::ListUsers { filter, response }
    })
    .await?;

    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<Json<User>, ServiceError> {
    let user = call(&state.channels.users, "Users", |response| UserRequest::GetUser {
        id,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, ServiceError> {
    log::info!("Admin {} updating user {}", admin.id, id);

    let user = call(&state.channels.users, "Users", |response| {
        UserRequest::UpdateUser {
            id,
            update,
            response,
        }
    })
    .await?;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    if admin.id == id {
        return Err(ServiceError::Validation(
            "admins cannot delete their own account".to_string(),
        ));
    }

    call(&state.channels.users, "Users", |response| UserRequest::DeleteUser {
        id,
        response,
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn adjust_balance(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(adjustment): Json<BalanceAdjustment>,
) -> Result<Json<LedgerEntry>, ServiceError> {
    log::info!(
        "Admin {} requested {} {} {} on {}",
        admin.id,
        adjustment.operation.as_str(),
        adjustment.amount,
        adjustment.currency,
        id
    );

    let entry = call(&state.channels.ledger, "Ledger", |response| {
        LedgerRequest::AdjustBalance {
            user_id: id,
            adjustment,
            response,
        }
    })
    .await?;

    Ok(Json(entry))
}
