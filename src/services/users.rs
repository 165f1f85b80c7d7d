use async_trait::async_trait;
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::feed::{ChangeKind, Collection};
use crate::models::users::{NewUser, User, UserFilter, UserUpdate};
use crate::repositories::users::UserRepository;

pub enum UserRequest {
    CreateUser {
        new_user: NewUser,
        response: Reply<User>,
    },
    GetUser {
        id: String,
        response: Reply<User>,
    },
    ListUsers {
        filter: UserFilter,
        response: Reply<Vec<User>>,
    },
    UpdateUser {
        id: String,
        update: UserUpdate,
        response: Reply<User>,
    },
    DeleteUser {
        id: String,
        response: Reply<()>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
    feed: ChangeFeed,
}

fn repository_error(e: anyhow::Error) -> ServiceError {
    ServiceError::Repository("Users".to_string(), e.to_string())
}

/// A signup that loses the race to a concurrent one trips the UNIQUE
/// constraints on id or email.
fn insert_error(e: anyhow::Error) -> ServiceError {
    let duplicate = e
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation());

    if duplicate {
        ServiceError::Validation("user id or email is already registered".to_string())
    } else {
        repository_error(e)
    }
}

impl UserRequestHandler {
    pub fn new(sql_conn: SqlitePool, feed: ChangeFeed) -> Self {
        let repository = UserRepository::new(sql_conn);

        UserRequestHandler { repository, feed }
    }

    pub async fn create_user(&self, new_user: &NewUser) -> Result<User, ServiceError> {
        let email = new_user.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::Validation(format!("invalid email: {}", email)));
        }
        if let Some(id) = &new_user.id {
            if id.trim().is_empty() {
                return Err(ServiceError::Validation("user id must not be blank".to_string()));
            }
            if self.repository.get_user_by_id(id).await.map_err(repository_error)?.is_some() {
                return Err(ServiceError::Validation(format!("user {} already exists", id)));
            }
        }
        if self.repository.email_taken(email).await.map_err(repository_error)? {
            return Err(ServiceError::Validation(format!(
                "email {} is already registered",
                email
            )));
        }

        let user = self
            .repository
            .insert_user(new_user)
            .await
            .map_err(insert_error)?;

        log::info!("Created user {} ({})", user.id, user.email);
        self.feed.publish(Collection::Users, &user.id, ChangeKind::Created);
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<User, ServiceError> {
        self.repository
            .get_user_by_id(id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, ServiceError> {
        self.repository
            .list_users(filter)
            .await
            .map_err(repository_error)
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<User, ServiceError> {
        if let Some(name) = &update.display_name {
            if name.trim().is_empty() {
                return Err(ServiceError::Validation(
                    "display name must not be blank".to_string(),
                ));
            }
        }

        let user = self
            .repository
            .update_user(id, update)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))?;

        self.feed.publish(Collection::Users, &user.id, ChangeKind::Updated);
        Ok(user)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ServiceError> {
        if !self.repository.delete_user(id).await.map_err(repository_error)? {
            return Err(ServiceError::NotFound(format!("user {}", id)));
        }

        log::info!("Deleted user {}", id);
        self.feed.publish(Collection::Users, id, ChangeKind::Deleted);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::CreateUser { new_user, response } => {
                let user = self.create_user(&new_user).await;
                let _ = response.send(user);
            }
            UserRequest::GetUser { id, response } => {
                let user = self.get_user(&id).await;
                let _ = response.send(user);
            }
            UserRequest::ListUsers { filter, response } => {
                let users = self.list_users(&filter).await;
                let _ = response.send(users);
            }
            UserRequest::UpdateUser {
                id,
                update,
                response,
            } => {
                let user = self.update_user(&id, &update).await;
                let _ = response.send(user);
            }
            UserRequest::DeleteUser { id, response } => {
                let result = self.delete_user(&id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::users::Role;

    fn signup(email: &str) -> NewUser {
        NewUser {
            id: None,
            email: email.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let handler = UserRequestHandler::new(database::memory_pool().await, ChangeFeed::new(8));

        handler.create_user(&signup("ana@example.com")).await.unwrap();
        let result = handler.create_user(&signup("ana@example.com")).await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert!(matches!(
            handler.create_user(&signup("not-an-email")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_duplicate_signups_fail_validation() {
        let handler = UserRequestHandler::new(database::memory_pool().await, ChangeFeed::new(8));
        let first = signup("race@example.com");
        let second = signup("race@example.com");

        let (a, b) = tokio::join!(handler.create_user(&first), handler.create_user(&second));
        assert!(a.is_ok() != b.is_ok());
        assert!(matches!(a.and(b), Err(ServiceError::Validation(_))));

        let raw = handler.repository.insert_user(&second).await.unwrap_err();
        assert!(matches!(insert_error(raw), ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn promotes_and_deletes_users() {
        let feed = ChangeFeed::new(8);
        let mut events = feed.subscribe();
        let handler = UserRequestHandler::new(database::memory_pool().await, feed);

        let user = handler.create_user(&signup("bo@example.com")).await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind, ChangeKind::Created);

        let updated = handler
            .update_user(
                &user.id,
                &UserUpdate {
                    display_name: None,
                    role: Some(Role::Admin),
                },
            )
            .await
            .unwrap();
        assert!(updated.is_admin());
        assert_eq!(updated.display_name, "bo@example.com");

        handler.delete_user(&user.id).await.unwrap();
        assert!(matches!(
            handler.get_user(&user.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            handler.delete_user(&user.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
