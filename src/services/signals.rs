use async_trait::async_trait;
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::feed::{ChangeKind, Collection};
use crate::models::signals::{NewSignal, SignalStatus, TradingSignal};
use crate::models::users::VipTier;
use crate::repositories::signals::SignalRepository;

pub enum SignalRequest {
    CreateSignal {
        signal: NewSignal,
        response: Reply<TradingSignal>,
    },
    ListSignals {
        status: Option<SignalStatus>,
        response: Reply<Vec<TradingSignal>>,
    },
    ListVisibleSignals {
        tier: VipTier,
        response: Reply<Vec<TradingSignal>>,
    },
    UpdateSignalStatus {
        id: String,
        status: SignalStatus,
        response: Reply<TradingSignal>,
    },
    DeleteSignal {
        id: String,
        response: Reply<()>,
    },
}

#[derive(Clone)]
pub struct SignalRequestHandler {
    repository: SignalRepository,
    feed: ChangeFeed,
}

fn repository_error(e: anyhow::Error) -> ServiceError {
    ServiceError::Repository("Signals".to_string(), e.to_string())
}

impl SignalRequestHandler {
    pub fn new(sql_conn: SqlitePool, feed: ChangeFeed) -> Self {
        let repository = SignalRepository::new(sql_conn);

        Self { repository, feed }
    }

    pub async fn create_signal(&self, signal: &NewSignal) -> Result<TradingSignal, ServiceError> {
        if signal.pair.trim().is_empty() {
            return Err(ServiceError::Validation("pair is required".to_string()));
        }
        let levels = signal
            .levels()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let signal = self
            .repository
            .insert_signal(signal, levels)
            .await
            .map_err(repository_error)?;

        log::info!(
            "Published {} signal {} on {}: SL {} TP {}",
            signal.direction.as_str(),
            signal.id,
            signal.pair,
            signal.stop_loss,
            signal.take_profit
        );
        self.feed
            .publish(Collection::TradingSignals, &signal.id, ChangeKind::Created);
        Ok(signal)
    }

    pub async fn list_signals(
        &self,
        status: Option<SignalStatus>,
    ) -> Result<Vec<TradingSignal>, ServiceError> {
        self.repository
            .list_signals(status)
            .await
            .map_err(repository_error)
    }

    /// Signals whose minimum tier the caller's effective tier reaches.
    pub async fn list_visible_signals(
        &self,
        tier: VipTier,
    ) -> Result<Vec<TradingSignal>, ServiceError> {
        let signals = self.list_signals(None).await?;

        Ok(signals
            .into_iter()
            .filter(|signal| signal.min_tier <= tier)
            .collect())
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
    ) -> Result<TradingSignal, ServiceError> {
        if status == SignalStatus::Activa {
            return Err(ServiceError::Validation(
                "a signal can only be closed as Completada or Fallida".to_string(),
            ));
        }

        let signal = self.repository.update_status(id, status).await?;

        log::info!("Signal {} closed as {}", signal.id, signal.status.as_str());
        self.feed
            .publish(Collection::TradingSignals, &signal.id, ChangeKind::Updated);
        Ok(signal)
    }

    pub async fn delete_signal(&self, id: &str) -> Result<(), ServiceError> {
        if !self.repository.delete_signal(id).await.map_err(repository_error)? {
            return Err(ServiceError::NotFound(format!("signal {}", id)));
        }

        self.feed
            .publish(Collection::TradingSignals, id, ChangeKind::Deleted);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<SignalRequest> for SignalRequestHandler {
    async fn handle_request(&self, request: SignalRequest) {
        match request {
            SignalRequest::CreateSignal { signal, response } => {
                let signal = self.create_signal(&signal).await;
                let _ = response.send(signal);
            }
            SignalRequest::ListSignals { status, response } => {
                let signals = self.list_signals(status).await;
                let _ = response.send(signals);
            }
            SignalRequest::ListVisibleSignals { tier, response } => {
                let signals = self.list_visible_signals(tier).await;
                let _ = response.send(signals);
            }
            SignalRequest::UpdateSignalStatus {
                id,
                status,
                response,
            } => {
                let signal = self.update_status(&id, status).await;
                let _ = response.send(signal);
            }
            SignalRequest::DeleteSignal { id, response } => {
                let result = self.delete_signal(&id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct SignalService;

impl SignalService {
    pub fn new() -> Self {
        SignalService {}
    }
}

#[async_trait]
impl Service<SignalRequest, SignalRequestHandler> for SignalService {}
