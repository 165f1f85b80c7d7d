use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{AdminCaller, AppState, Caller};
use crate::models::chat::{ChatMessage, ConversationSummary, NewChatMessage, Sender};
use crate::services::chat::ChatRequest;
use crate::services::{call, ServiceError};

const SERVICE: &str = "Chat";

async fn conversation(
    state: &AppState,
    user_id: String,
    reader: Sender,
) -> Result<Json<Vec<ChatMessage>>, ServiceError> {
    let messages = call(&state.channels.chat, SERVICE, |response| {
        ChatRequest::GetConversation {
            user_id,
            reader,
            response,
        }
    })
    .await?;

    Ok(Json(messages))
}

async fn send(
    state: &AppState,
    user_id: String,
    sender: Sender,
    body: String,
) -> Result<(StatusCode, Json<ChatMessage>), ServiceError> {
    let message = call(&state.channels.chat, SERVICE, |response| {
        ChatRequest::SendMessage {
            user_id,
            sender,
            body,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn my_conversation(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<Vec<ChatMessage>>, ServiceError> {
    conversation(&state, user.id, Sender::User).await
}

pub async fn send_mine(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(message): Json<NewChatMessage>,
) -> Result<(StatusCode, Json<ChatMessage>), ServiceError> {
    send(&state, user.id, Sender::User, message.body).await
}

pub async fn list_conversations(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Vec<ConversationSummary>>, ServiceError> {
    let conversations = call(&state.channels.chat, SERVICE, |response| {
        ChatRequest::ListConversations { response }
    })
    .await?;

    Ok(Json(conversations))
}

pub async fn read_conversation(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ServiceError> {
    conversation(&state, user_id, Sender::Admin).await
}

pub async fn send_reply(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(user_id): Path<String>,
    Json(message): Json<NewChatMessage>,
) -> Result<(StatusCode, Json<ChatMessage>), ServiceError> {
    send(&state, user_id, Sender::Admin, message.body).await
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let deleted = call(&state.channels.chat, SERVICE, |response| {
        ChatRequest::DeleteConversation { user_id, response }
    })
    .await?;

    Ok(Json(json!({ "deleted": deleted })))
}
