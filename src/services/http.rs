use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::{feed::ChangeFeed, Channels, ServiceError};

mod analytics;
mod auth;
mod chat;
mod content;
mod feed;
mod market;
mod signals;
mod transfers;
mod users;
mod vip;

pub use auth::{AdminCaller, Caller, USER_ID_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub channels: Channels,
    pub feed: ChangeFeed,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied(_) | ServiceError::FeatureDisabled(_) => {
                StatusCode::FORBIDDEN
            }
            ServiceError::InsufficientFunds(_) | ServiceError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            ServiceError::ExternalService(..) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_)
            | ServiceError::Database(_)
            | ServiceError::Repository(..)
            | ServiceError::Communication(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "Not found",
            ServiceError::Validation(_) => "Invalid request",
            ServiceError::Unauthorized => "Unauthorized",
            ServiceError::PermissionDenied(_) => "Permission denied",
            ServiceError::InsufficientFunds(_) => "Insufficient funds",
            ServiceError::InvalidTransition(_) => "Invalid transition",
            ServiceError::FeatureDisabled(_) => "Feature disabled",
            ServiceError::ExternalService(..) => "External service error",
            ServiceError::Database(_) => "Database error",
            ServiceError::Internal(_) | ServiceError::Repository(..) | ServiceError::Communication(..) => {
                "Internal server error"
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }

        (
            status,
            Json(json!({
                "error": self.kind(),
                "details": self.to_string()
            })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/users", post(users::signup))
        .route("/api/news", get(content::published_news))
        .route("/api/site/updates", get(content::list_site_updates))
        .route("/api/site/settings", get(content::get_settings))
        .route("/api/vip/plans", get(vip::active_plans))
        .route("/api/contact", post(content::create_contact))
        .route("/api/analytics/visit", post(analytics::record_visit))
        .route("/api/market/pairs", get(market::list_pairs))
        .route("/api/market/price/{symbol}", get(market::get_price));

    let me = Router::new()
        .route("/api/me", get(users::me))
        .route("/api/me/ledger", get(users::my_ledger))
        .route(
            "/api/me/deposits",
            get(transfers::my_deposits).post(transfers::create_deposit),
        )
        .route(
            "/api/me/withdrawals",
            get(transfers::my_withdrawals).post(transfers::create_withdrawal),
        )
        .route("/api/me/vip/purchase", post(vip::purchase))
        .route("/api/me/signals", get(signals::visible_signals))
        .route("/api/me/chat", get(chat::my_conversation).post(chat::send_mine));

    let admin = Router::new()
        .route("/api/admin/users", get(users::list_users))
        .route(
            "/api/admin/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/admin/users/{id}/balance", post(users::adjust_balance))
        .route("/api/admin/users/{id}/vip", post(vip::grant))
        .route("/api/admin/users/{id}/ledger", get(users::user_ledger))
        .route("/api/admin/deposits", get(transfers::list_deposits))
        .route("/api/admin/deposits/{id}/approve", post(transfers::approve_deposit))
        .route("/api/admin/deposits/{id}/reject", post(transfers::reject_deposit))
        .route("/api/admin/withdrawals", get(transfers::list_withdrawals))
        .route(
            "/api/admin/withdrawals/{id}/complete",
            post(transfers::complete_withdrawal),
        )
        .route(
            "/api/admin/withdrawals/{id}/reject",
            post(transfers::reject_withdrawal),
        )
        .route(
            "/api/admin/signals",
            get(signals::list_signals).post(signals::create_signal),
        )
        .route("/api/admin/signals/{id}", delete(signals::delete_signal))
        .route("/api/admin/signals/{id}/status", put(signals::update_status))
        .route(
            "/api/admin/news",
            get(content::all_news).post(content::create_news),
        )
        .route(
            "/api/admin/news/{id}",
            put(content::update_news).delete(content::delete_news),
        )
        .route(
            "/api/admin/site/updates",
            get(content::list_site_updates).post(content::create_site_update),
        )
        .route(
            "/api/admin/site/updates/{id}",
            put(content::update_site_update).delete(content::delete_site_update),
        )
        .route(
            "/api/admin/site/settings",
            get(content::get_settings).put(content::update_settings),
        )
        .route(
            "/api/admin/vip/plans",
            get(vip::all_plans).post(vip::create_plan),
        )
        .route(
            "/api/admin/vip/plans/{id}",
            put(vip::update_plan).delete(vip::delete_plan),
        )
        .route("/api/admin/contacts", get(content::list_contacts))
        .route("/api/admin/contacts/closed", delete(content::delete_closed_contacts))
        .route("/api/admin/contacts/{id}", delete(content::delete_contact))
        .route("/api/admin/contacts/{id}/reply", post(content::reply_contact))
        .route("/api/admin/chat", get(chat::list_conversations))
        .route(
            "/api/admin/chat/{user_id}",
            get(chat::read_conversation)
                .post(chat::send_reply)
                .delete(chat::delete_conversation),
        )
        .route("/api/admin/analytics", get(analytics::list_visits))
        .route("/api/admin/feed", get(feed::subscribe));

    public
        .merge(me)
        .merge(admin)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, state: AppState) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("HTTP server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received.");
}

#[cfg(test)]
mod tests {
    use axum::body::{self, Body};
    use axum::http::{Method, Request};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use sqlx::SqlitePool;
    use tower::ServiceExt;

    use super::*;
    use crate::database;
    use crate::models::users::{Role, UserUpdate};
    use crate::repositories::users::UserRepository;
    use crate::services::start_services;
    use crate::settings;

    async fn app() -> (Router, SqlitePool) {
        let pool = database::memory_pool().await;
        let settings = settings::Settings {
            server: settings::Server {
                listen: "127.0.0.1:0".to_string(),
            },
            database: settings::Database {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            market: settings::Market {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_secs: 1,
            },
            geolocation: settings::Geolocation {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_secs: 1,
            },
            vip: settings::Vip {
                sweep_interval_secs: 3600,
            },
        };

        let (channels, feed) = start_services(pool.clone(), settings).await.unwrap();
        (router(AppState { channels, feed }), pool)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        caller: Option<&str>,
        json: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            request = request.header(USER_ID_HEADER, caller);
        }
        let request = match json {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn signup(app: &Router, id: &str) {
        let (status, _) = send(
            app,
            Method::POST,
            "/api/users",
            Some(id),
            Some(serde_json::json!({ "email": format!("{}@example.com", id) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn promote(pool: &SqlitePool, id: &str) {
        UserRepository::new(pool.clone())
            .update_user(
                id,
                &UserUpdate {
                    display_name: None,
                    role: Some(Role::Admin),
                },
            )
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn admin_routes_check_identity_and_role() {
        let (app, pool) = app().await;
        signup(&app, "member").await;
        signup(&app, "boss").await;
        promote(&pool, "boss").await;

        let (status, body) = send(&app, Method::GET, "/api/admin/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, _) = send(&app, Method::GET, "/api/admin/users", Some("ghost"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, Method::GET, "/api/admin/users", Some("member"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Permission denied");

        let (status, body) = send(&app, Method::GET, "/api/admin/users", Some("boss"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));

        let (status, _) = send(&app, Method::GET, "/api/me", Some("member"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn deposit_approval_round_trip() {
        let (app, pool) = app().await;
        signup(&app, "member").await;
        signup(&app, "boss").await;
        promote(&pool, "boss").await;

        let (status, deposit) = send(
            &app,
            Method::POST,
            "/api/me/deposits",
            Some("member"),
            Some(serde_json::json!({ "amount": "25", "currency": "USD", "method": "bank" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(deposit["status"], "Pendiente");
        let approve = format!(
            "/api/admin/deposits/{}/approve",
            deposit["id"].as_str().unwrap()
        );

        let (status, _) = send(
            &app,
            Method::POST,
            &approve,
            Some("member"),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, approved) = send(
            &app,
            Method::POST,
            &approve,
            Some("boss"),
            Some(serde_json::json!({ "note": "ok" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "Aprobado");

        let (status, body) = send(
            &app,
            Method::POST,
            &approve,
            Some("boss"),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Invalid transition");

        let (status, profile) = send(&app, Method::GET, "/api/me", Some("member"), None).await;
        assert_eq!(status, StatusCode::OK);
        let balance: Decimal = profile["balanceUSD"]
            .to_string()
            .trim_matches('"')
            .parse()
            .unwrap();
        assert_eq!(balance, Decimal::from(25));
    }

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ServiceError::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::FeatureDisabled("chat".into()), StatusCode::FORBIDDEN),
            (ServiceError::InsufficientFunds("x".into()), StatusCode::CONFLICT),
            (ServiceError::InvalidTransition("x".into()), StatusCode::CONFLICT),
            (
                ServiceError::ExternalService("Market".into(), "a".into(), "b".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ServiceError::Repository("Users".into(), "x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
