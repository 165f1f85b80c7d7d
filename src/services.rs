use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};

use crate::repositories::geolocation::GeolocationRepository;
use crate::repositories::ledger::LedgerError;
use crate::repositories::market::MarketRepository;
use crate::repositories::vip::PurchaseError;
use crate::repositories::ReviewError;
use crate::settings::Settings;

pub mod analytics;
pub mod chat;
pub mod content;
pub mod feed;
pub mod http;
pub mod ledger;
pub mod market;
pub mod signals;
pub mod transfers;
pub mod users;
pub mod vip;

const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Missing or unknown caller identity")]
    Unauthorized,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    InsufficientFunds(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("External service error: {0} -> {1} => {2}")]
    ExternalService(String, String, String),
}

impl From<LedgerError> for ServiceError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::UnknownUser(id) => ServiceError::NotFound(format!("user {}", id)),
            LedgerError::InvalidAmount(_) | LedgerError::Overflow { .. } => {
                ServiceError::Validation(error.to_string())
            }
            LedgerError::InsufficientFunds { .. } => {
                ServiceError::InsufficientFunds(error.to_string())
            }
            LedgerError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

impl From<ReviewError> for ServiceError {
    fn from(error: ReviewError) -> Self {
        match error {
            ReviewError::NotFound(id) => ServiceError::NotFound(id),
            ReviewError::InvalidTransition { .. } => {
                ServiceError::InvalidTransition(error.to_string())
            }
            ReviewError::Ledger(e) => e.into(),
            ReviewError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

impl From<PurchaseError> for ServiceError {
    fn from(error: PurchaseError) -> Self {
        match error {
            PurchaseError::UnknownPlan(id) => ServiceError::NotFound(format!("plan {}", id)),
            PurchaseError::InactivePlan(_) | PurchaseError::DurationOutOfRange(_) => {
                ServiceError::Validation(error.to_string())
            }
            PurchaseError::Ledger(e) => e.into(),
            PurchaseError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

/// Reply half every service request carries.
pub type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Sends a request built around a fresh reply channel and waits for the
/// answer.
pub async fn call<R, T>(
    channel: &mpsc::Sender<R>,
    service: &str,
    request: impl FnOnce(Reply<T>) -> R,
) -> Result<T, ServiceError> {
    let (reply_tx, reply_rx) = oneshot::channel();

    channel
        .send(request(reply_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    reply_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

/// Senders for every running service.
#[derive(Clone)]
pub struct Channels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub ledger: mpsc::Sender<ledger::LedgerRequest>,
    pub transfers: mpsc::Sender<transfers::TransferRequest>,
    pub signals: mpsc::Sender<signals::SignalRequest>,
    pub vip: mpsc::Sender<vip::VipRequest>,
    pub content: mpsc::Sender<content::ContentRequest>,
    pub chat: mpsc::Sender<chat::ChatRequest>,
    pub analytics: mpsc::Sender<analytics::AnalyticsRequest>,
    pub market: mpsc::Sender<market::MarketRequest>,
}

pub async fn start_services(
    pool: SqlitePool,
    settings: Settings,
) -> Result<(Channels, feed::ChangeFeed), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ledger_tx, mut ledger_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (transfer_tx, mut transfer_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (signal_tx, mut signal_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (vip_tx, mut vip_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (content_tx, mut content_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (chat_tx, mut chat_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (analytics_tx, mut analytics_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (market_tx, mut market_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let change_feed = feed::ChangeFeed::new(feed::FEED_CAPACITY);
    let locks = ledger::UserLocks::default();

    let market_repository = MarketRepository::new(
        settings.market.base_url.clone(),
        Duration::from_secs(settings.market.timeout_secs),
    )?;
    let geolocation_repository = GeolocationRepository::new(
        settings.geolocation.base_url.clone(),
        Duration::from_secs(settings.geolocation.timeout_secs),
    )?;

    log::info!("Starting user service.");
    let mut user_service = users::UserService::new();
    let handler = users::UserRequestHandler::new(pool.clone(), change_feed.clone());
    tokio::spawn(async move {
        user_service.run(handler, &mut user_rx).await;
    });

    log::info!("Starting ledger service.");
    let mut ledger_service = ledger::LedgerService::new();
    let handler =
        ledger::LedgerRequestHandler::new(pool.clone(), locks.clone(), change_feed.clone());
    tokio::spawn(async move {
        ledger_service.run(handler, &mut ledger_rx).await;
    });

    log::info!("Starting transfer service.");
    let mut transfer_service = transfers::TransferService::new();
    let handler =
        transfers::TransferRequestHandler::new(pool.clone(), locks.clone(), change_feed.clone());
    tokio::spawn(async move {
        transfer_service.run(handler, &mut transfer_rx).await;
    });

    log::info!("Starting signal service.");
    let mut signal_service = signals::SignalService::new();
    let handler = signals::SignalRequestHandler::new(pool.clone(), change_feed.clone());
    tokio::spawn(async move {
        signal_service.run(handler, &mut signal_rx).await;
    });

    log::info!("Starting VIP service.");
    let mut vip_service = vip::VipService::new();
    let handler = vip::VipRequestHandler::new(pool.clone(), locks.clone(), change_feed.clone());
    handler
        .start_expiry_sweep(Duration::from_secs(settings.vip.sweep_interval_secs))
        .await;
    tokio::spawn(async move {
        vip_service.run(handler, &mut vip_rx).await;
    });

    log::info!("Starting content service.");
    let mut content_service = content::ContentService::new();
    let handler = content::ContentRequestHandler::new(pool.clone(), change_feed.clone());
    tokio::spawn(async move {
        content_service.run(handler, &mut content_rx).await;
    });

    log::info!("Starting chat service.");
    let mut chat_service = chat::ChatService::new();
    let handler = chat::ChatRequestHandler::new(pool.clone(), change_feed.clone());
    tokio::spawn(async move {
        chat_service.run(handler, &mut chat_rx).await;
    });

    log::info!("Starting analytics service.");
    let mut analytics_service = analytics::AnalyticsService::new();
    let handler = analytics::AnalyticsRequestHandler::new(
        pool.clone(),
        geolocation_repository,
        change_feed.clone(),
    );
    tokio::spawn(async move {
        analytics_service.run(handler, &mut analytics_rx).await;
    });

    log::info!("Starting market service.");
    let mut market_service = market::MarketService::new();
    let handler = market::MarketRequestHandler::new(market_repository);
    tokio::spawn(async move {
        market_service.run(handler, &mut market_rx).await;
    });

    let channels = Channels {
        users: user_tx,
        ledger: ledger_tx,
        transfers: transfer_tx,
        signals: signal_tx,
        vip: vip_tx,
        content: content_tx,
        chat: chat_tx,
        analytics: analytics_tx,
        market: market_tx,
    };

    log::info!("Started services.");
    Ok((channels, change_feed))
}
