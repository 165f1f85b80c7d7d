use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{AdminCaller, AppState, Caller};
use crate::models::content::{VipGrant, VipPlan, VipPlanInput, VipPurchase};
use crate::models::users::User;
use crate::services::vip::VipRequest;
use crate::services::{call, ServiceError};

const SERVICE: &str = "VIP";

async fn plans(state: &AppState, active_only: bool) -> Result<Json<Vec<VipPlan>>, ServiceError> {
    let plans = call(&state.channels.vip, SERVICE, |response| VipRequest::ListPlans {
        active_only,
        response,
    })
    .await?;

    Ok(Json(plans))
}

pub async fn active_plans(State(state): State<AppState>) -> Result<Json<Vec<VipPlan>>, ServiceError> {
    plans(&state, true).await
}

pub async fn all_plans(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Vec<VipPlan>>, ServiceError> {
    plans(&state, false).await
}

pub async fn create_plan(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(plan): Json<VipPlanInput>,
) -> Result<(StatusCode, Json<VipPlan>), ServiceError> {
    let plan = call(&state.channels.vip, SERVICE, |response| VipRequest::CreatePlan {
        plan,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
    Json(plan): Json<VipPlanInput>,
) -> Result<Json<VipPlan>, ServiceError> {
    let plan = call(&state.channels.vip, SERVICE, |response| VipRequest::UpdatePlan {
        id,
        plan,
        response,
    })
    .await?;

    Ok(Json(plan))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    call(&state.channels.vip, SERVICE, |response| VipRequest::DeletePlan {
        id,
        response,
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn grant(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<String>,
    Json(grant): Json<VipGrant>,
) -> Result<Json<User>, ServiceError> {
    log::info!("Admin {} granting {} to {}", admin.id, grant.tier, id);

    let user = call(&state.channels.vip, SERVICE, |response| VipRequest::GrantVip {
        user_id: id,
        tier: grant.tier,
        days: grant.days,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn purchase(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(purchase): Json<VipPurchase>,
) -> Result<Json<User>, ServiceError> {
    let user = call(&state.channels.vip, SERVICE, |response| VipRequest::PurchasePlan {
        user_id: user.id,
        plan_id: purchase.plan_id,
        response,
    })
    .await?;

    Ok(Json(user))
}
