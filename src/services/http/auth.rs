use axum::{extract::FromRequestParts, http::request::Parts};

use super::AppState;
use crate::models::users::User;
use crate::services::{call, users::UserRequest, ServiceError};

/// Identity forwarded by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, loaded from the users table.
pub struct Caller(pub User);

/// Caller whose stored role is `admin`.
pub struct AdminCaller(pub User);

pub fn header_user_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = header_user_id(parts).ok_or(ServiceError::Unauthorized)?;

        match call(&state.channels.users, "Users", |response| UserRequest::GetUser {
            id,
            response,
        })
        .await
        {
            Ok(user) => Ok(Caller(user)),
            Err(ServiceError::NotFound(_)) => Err(ServiceError::Unauthorized),
            Err(e) => Err(e),
        }
    }
}

impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Caller(user) = Caller::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            log::warn!("User {} tried to reach {}", user.id, parts.uri.path());
            return Err(ServiceError::PermissionDenied(
                "admin role required".to_string(),
            ));
        }
        Ok(AdminCaller(user))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[test]
    fn reads_trimmed_identity_header() {
        let (parts, _) = Request::builder()
            .header(USER_ID_HEADER, "  uid-42 ")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(header_user_id(&parts), Some("uid-42".to_string()));

        let (parts, _) = Request::builder()
            .header(USER_ID_HEADER, "")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(header_user_id(&parts), None);
    }
}
