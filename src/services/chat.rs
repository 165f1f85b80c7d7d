use async_trait::async_trait;
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::chat::{ChatMessage, ConversationSummary, Sender};
use crate::models::feed::{ChangeKind, Collection};
use crate::repositories::chat::ChatRepository;
use crate::repositories::site::SiteRepository;
use crate::repositories::users::UserRepository;

const CHAT_FEATURE: &str = "chat";
const MAX_MESSAGE_LEN: usize = 4000;

pub enum ChatRequest {
    SendMessage {
        user_id: String,
        sender: Sender,
        body: String,
        response: Reply<ChatMessage>,
    },
    GetConversation {
        user_id: String,
        reader: Sender,
        response: Reply<Vec<ChatMessage>>,
    },
    ListConversations {
        response: Reply<Vec<ConversationSummary>>,
    },
    DeleteConversation {
        user_id: String,
        response: Reply<u64>,
    },
}

#[derive(Clone)]
pub struct ChatRequestHandler {
    repository: ChatRepository,
    site: SiteRepository,
    users: UserRepository,
    feed: ChangeFeed,
}

fn repository_error(e: anyhow::Error) -> ServiceError {
    ServiceError::Repository("Chat".to_string(), e.to_string())
}

impl ChatRequestHandler {
    pub fn new(sql_conn: SqlitePool, feed: ChangeFeed) -> Self {
        Self {
            repository: ChatRepository::new(sql_conn.clone()),
            site: SiteRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn),
            feed,
        }
    }

    async fn chat_enabled(&self) -> Result<bool, ServiceError> {
        let settings = self
            .site
            .get_settings()
            .await
            .map_err(|e| ServiceError::Repository("Site".to_string(), e.to_string()))?;

        Ok(settings.feature_enabled(CHAT_FEATURE))
    }

    pub async fn send_message(
        &self,
        user_id: &str,
        sender: Sender,
        body: &str,
    ) -> Result<ChatMessage, ServiceError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ServiceError::Validation("message must not be empty".to_string()));
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(ServiceError::Validation(format!(
                "message longer than {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        if sender == Sender::User && !self.chat_enabled().await? {
            return Err(ServiceError::FeatureDisabled(CHAT_FEATURE.to_string()));
        }

        let user = self
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(|e| ServiceError::Repository("Users".to_string(), e.to_string()))?;
        if user.is_none() {
            return Err(ServiceError::NotFound(format!("user {}", user_id)));
        }

        let message = self
            .repository
            .insert_message(user_id, sender, body)
            .await
            .map_err(repository_error)?;

        self.feed.publish(Collection::Chat, user_id, ChangeKind::Created);
        Ok(message)
    }

    pub async fn get_conversation(
        &self,
        user_id: &str,
        reader: Sender,
    ) -> Result<Vec<ChatMessage>, ServiceError> {
        self.repository
            .read_conversation(user_id, reader)
            .await
            .map_err(repository_error)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ServiceError> {
        self.repository
            .list_conversations()
            .await
            .map_err(repository_error)
    }

    pub async fn delete_conversation(&self, user_id: &str) -> Result<u64, ServiceError> {
        let deleted = self
            .repository
            .delete_conversation(user_id)
            .await
            .map_err(repository_error)?;
        if deleted == 0 {
            return Err(ServiceError::NotFound(format!("conversation {}", user_id)));
        }

        self.feed.publish(Collection::Chat, user_id, ChangeKind::Deleted);
        Ok(deleted)
    }
}

#[async_trait]
impl RequestHandler<ChatRequest> for ChatRequestHandler {
    async fn handle_request(&self, request: ChatRequest) {
        match request {
            ChatRequest::SendMessage {
                user_id,
                sender,
                body,
                response,
            } => {
                let message = self.send_message(&user_id, sender, &body).await;
                let _ = response.send(message);
            }
            ChatRequest::GetConversation {
                user_id,
                reader,
                response,
            } => {
                let messages = self.get_conversation(&user_id, reader).await;
                let _ = response.send(messages);
            }
            ChatRequest::ListConversations { response } => {
                let conversations = self.list_conversations().await;
                let _ = response.send(conversations);
            }
            ChatRequest::DeleteConversation { user_id, response } => {
                let deleted = self.delete_conversation(&user_id).await;
                let _ = response.send(deleted);
            }
        }
    }
}

pub struct ChatService;

impl ChatService {
    pub fn new() -> Self {
        ChatService {}
    }
}

#[async_trait]
impl Service<ChatRequest, ChatRequestHandler> for ChatService {}
