use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::feed::ChangeFeed;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::feed::{ChangeKind, Collection};
use crate::models::ledger::{BalanceAdjustment, LedgerEntry};
use crate::models::users::Balances;
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::users::UserRepository;

pub const DEFAULT_ENTRY_LIMIT: i64 = 100;

/// One async mutex per user id. Every balance mutation of a user runs while
/// holding that user's guard. Entries are dropped again once nobody holds
/// or waits for them.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

pub struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock(&self, user_id: &str) -> UserLockGuard {
        let mutex = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        UserLockGuard {
            guard: Some(mutex.lock_owned().await),
            user_id: user_id.to_string(),
            locks: self.locks.clone(),
        }
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still points at the mutex: no holder, no waiter.
        self.locks
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

pub enum LedgerRequest {
    AdjustBalance {
        user_id: String,
        adjustment: BalanceAdjustment,
        response: Reply<LedgerEntry>,
    },
    GetBalances {
        user_id: String,
        response: Reply<Balances>,
    },
    ListEntries {
        user_id: String,
        limit: Option<i64>,
        response: Reply<Vec<LedgerEntry>>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    repository: LedgerRepository,
    user_repository: UserRepository,
    locks: UserLocks,
    feed: ChangeFeed,
}

impl LedgerRequestHandler {
    pub fn new(sql_conn: SqlitePool, locks: UserLocks, feed: ChangeFeed) -> Self {
        let repository = LedgerRepository::new(sql_conn.clone());
        let user_repository = UserRepository::new(sql_conn);

        Self {
            repository,
            user_repository,
            locks,
            feed,
        }
    }

    async fn ensure_user(&self, user_id: &str) -> Result<(), ServiceError> {
        match self.user_repository.get_user_by_id(user_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(ServiceError::NotFound(format!("user {}", user_id))),
            Err(e) => Err(ServiceError::Repository("Users".to_string(), e.to_string())),
        }
    }

    pub async fn adjust_balance(
        &self,
        user_id: &str,
        adjustment: &BalanceAdjustment,
    ) -> Result<LedgerEntry, ServiceError> {
        let _guard = self.locks.lock(user_id).await;

        let entry = self.repository.adjust(user_id, adjustment).await?;
        log::info!(
            "Balance {} {} {} for user {}: {} -> {}",
            entry.operation.as_str(),
            entry.amount,
            entry.currency,
            user_id,
            entry.balance_before,
            entry.balance_after
        );

        self.feed.publish(Collection::Ledger, &entry.id, ChangeKind::Created);
        self.feed.publish(Collection::Users, user_id, ChangeKind::Updated);
        Ok(entry)
    }

    pub async fn get_balances(&self, user_id: &str) -> Result<Balances, ServiceError> {
        self.ensure_user(user_id).await?;

        self.repository
            .get_balances(user_id)
            .await
            .map_err(|e| ServiceError::Repository("Ledger".to_string(), e.to_string()))
    }

    pub async fn list_entries(
        &self,
        user_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<LedgerEntry>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_ENTRY_LIMIT);
        if limit <= 0 {
            return Err(ServiceError::Validation("limit must be positive".to_string()));
        }

        self.repository
            .list_entries(user_id, limit)
            .await
            .map_err(|e| ServiceError::Repository("Ledger".to_string(), e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::AdjustBalance {
                user_id,
                adjustment,
                response,
            } => {
                let result = self.adjust_balance(&user_id, &adjustment).await;
                if let Err(e) = &result {
                    log::warn!("Balance adjustment for {} failed: {}", user_id, e);
                }
                let _ = response.send(result);
            }
            LedgerRequest::GetBalances { user_id, response } => {
                let balances = self.get_balances(&user_id).await;
                let _ = response.send(balances);
            }
            LedgerRequest::ListEntries {
                user_id,
                limit,
                response,
            } => {
                let entries = self.list_entries(&user_id, limit).await;
                let _ = response.send(entries);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {}
