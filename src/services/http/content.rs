use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{AdminCaller, AppState};
use crate::models::content::{
    ContactFilter, ContactReply, ContactRequest, NewContactRequest, NewsArticle, NewsInput,
    SiteSettings, SiteSettingsPatch, SiteUpdate, SiteUpdateInput,
};
use crate::services::content::ContentRequest;
use crate::services::{call, ServiceError};

const SERVICE: &str = "Content";

async fn news(state: &AppState, published_only: bool) -> Result<Json<Vec<NewsArticle>>, ServiceError> {
    let articles = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::ListNews {
            published_only,
            response,
        }
    })
    .await?;

    Ok(Json(articles))
}

pub async fn published_news(
    State(state): State<AppState>,
) -> Result<Json<Vec<NewsArticle>>, ServiceError> {
    news(&state, true).await
}

pub async fn all_news(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Vec<NewsArticle>>, ServiceError> {
    news(&state, false).await
}

pub async fn create_news(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(article): Json<NewsInput>,
) -> Result<(StatusCode, Json<NewsArticle>), ServiceError> {
    let article = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::CreateNews { article, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(article)))
}

pub async fn update_news(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
    Json(article): Json<NewsInput>,
) -> Result<Json<NewsArticle>, ServiceError> {
    let article = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::UpdateNews {
            id,
            article,
            response,
        }
    })
    .await?;

    Ok(Json(article))
}

pub async fn delete_news(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    call(&state.channels.content, SERVICE, |response| {
        ContentRequest::DeleteNews { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_site_updates(
    State(state): State<AppState>,
) -> Result<Json<Vec<SiteUpdate>>, ServiceError> {
    let updates = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::ListSiteUpdates { response }
    })
    .await?;

    Ok(Json(updates))
}

pub async fn create_site_update(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(update): Json<SiteUpdateInput>,
) -> Result<(StatusCode, Json<SiteUpdate>), ServiceError> {
    let update = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::CreateSiteUpdate { update, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(update)))
}

pub async fn update_site_update(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
    Json(update): Json<SiteUpdateInput>,
) -> Result<Json<SiteUpdate>, ServiceError> {
    let update = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::UpdateSiteUpdate {
            id,
            update,
            response,
        }
    })
    .await?;

    Ok(Json(update))
}

pub async fn delete_site_update(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    call(&state.channels.content, SERVICE, |response| {
        ContentRequest::DeleteSiteUpdate { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ServiceError> {
    let settings = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::GetSettings { response }
    })
    .await?;

    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Json(patch): Json<SiteSettingsPatch>,
) -> Result<Json<SiteSettings>, ServiceError> {
    log::info!("Admin {} updating site settings", admin.id);

    let settings = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::UpdateSettings { patch, response }
    })
    .await?;

    Ok(Json(settings))
}

pub async fn create_contact(
    State(state): State<AppState>,
    Json(request): Json<NewContactRequest>,
) -> Result<(StatusCode, Json<ContactRequest>), ServiceError> {
    let request = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::CreateContact { request, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(filter): Query<ContactFilter>,
) -> Result<Json<Vec<ContactRequest>>, ServiceError> {
    let requests = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::ListContacts {
            status: filter.status,
            response,
        }
    })
    .await?;

    Ok(Json(requests))
}

pub async fn reply_contact(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
    Json(body): Json<ContactReply>,
) -> Result<Json<ContactRequest>, ServiceError> {
    let request = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::ReplyContact {
            id,
            reply: body.reply,
            response,
        }
    })
    .await?;

    Ok(Json(request))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    call(&state.channels.content, SERVICE, |response| {
        ContentRequest::DeleteContact { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_closed_contacts(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Value>, ServiceError> {
    let deleted = call(&state.channels.content, SERVICE, |response| {
        ContentRequest::DeleteClosedContacts { response }
    })
    .await?;

    Ok(Json(json!({ "deleted": deleted })))
}
