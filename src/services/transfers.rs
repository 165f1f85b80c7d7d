use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::ledger::UserLocks;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::feed::{ChangeKind, Collection};
use crate::models::ledger::LedgerEntry;
use crate::models::transfers::{
    Deposit, DepositStatus, NewDeposit, NewWithdrawal, TransferFilter, Withdrawal,
    WithdrawalStatus,
};
use crate::models::users::User;
use crate::repositories::deposits::DepositRepository;
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::users::UserRepository;
use crate::repositories::withdrawals::WithdrawalRepository;

pub enum TransferRequest {
    CreateDeposit {
        user_id: String,
        deposit: NewDeposit,
        response: Reply<Deposit>,
    },
    CreateWithdrawal {
        user_id: String,
        withdrawal: NewWithdrawal,
        response: Reply<Withdrawal>,
    },
    ListDeposits {
        filter: TransferFilter,
        response: Reply<Vec<Deposit>>,
    },
    ListWithdrawals {
        filter: TransferFilter,
        response: Reply<Vec<Withdrawal>>,
    },
    ApproveDeposit {
        id: String,
        note: Option<String>,
        response: Reply<Deposit>,
    },
    RejectDeposit {
        id: String,
        note: Option<String>,
        response: Reply<Deposit>,
    },
    CompleteWithdrawal {
        id: String,
        note: Option<String>,
        response: Reply<Withdrawal>,
    },
    RejectWithdrawal {
        id: String,
        note: Option<String>,
        response: Reply<Withdrawal>,
    },
}

#[derive(Clone)]
pub struct TransferRequestHandler {
    deposits: DepositRepository,
    withdrawals: WithdrawalRepository,
    users: UserRepository,
    ledger: LedgerRepository,
    locks: UserLocks,
    feed: ChangeFeed,
}

fn repository_error(name: &str) -> impl FnOnce(anyhow::Error) -> ServiceError + '_ {
    move |e| ServiceError::Repository(name.to_string(), e.to_string())
}

fn positive_amount(amount: Decimal) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

fn parse_status<T: std::str::FromStr>(status: Option<&str>) -> Result<Option<T>, ServiceError>
where
    T::Err: std::fmt::Display,
{
    status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| ServiceError::Validation(e.to_string())))
        .transpose()
}

impl TransferRequestHandler {
    pub fn new(sql_conn: SqlitePool, locks: UserLocks, feed: ChangeFeed) -> Self {
        Self {
            deposits: DepositRepository::new(sql_conn.clone()),
            withdrawals: WithdrawalRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn.clone()),
            ledger: LedgerRepository::new(sql_conn),
            locks,
            feed,
        }
    }

    async fn user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.users
            .get_user_by_id(user_id)
            .await
            .map_err(repository_error("Users"))?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))
    }

    fn settled(&self, collection: Collection, id: &str, entry: &LedgerEntry) {
        self.feed.publish(collection, id, ChangeKind::Updated);
        self.feed.publish(Collection::Ledger, &entry.id, ChangeKind::Created);
        self.feed.publish(Collection::Users, &entry.user_id, ChangeKind::Updated);
    }

    pub async fn create_deposit(
        &self,
        user_id: &str,
        deposit: &NewDeposit,
    ) -> Result<Deposit, ServiceError> {
        positive_amount(deposit.amount)?;
        if deposit.method.trim().is_empty() {
            return Err(ServiceError::Validation("deposit method is required".to_string()));
        }

        let user = self.user(user_id).await?;
        let deposit = self
            .deposits
            .insert_deposit(&user, deposit)
            .await
            .map_err(repository_error("Deposits"))?;

        log::info!(
            "Deposit {} requested by {}: {} {}",
            deposit.id,
            user.id,
            deposit.amount,
            deposit.currency
        );
        self.feed.publish(Collection::Deposits, &deposit.id, ChangeKind::Created);
        Ok(deposit)
    }

    pub async fn create_withdrawal(
        &self,
        user_id: &str,
        withdrawal: &NewWithdrawal,
    ) -> Result<Withdrawal, ServiceError> {
        positive_amount(withdrawal.amount)?;
        if withdrawal.destination.trim().is_empty() {
            return Err(ServiceError::Validation(
                "withdrawal destination is required".to_string(),
            ));
        }

        let user = self.user(user_id).await?;
        let available = self
            .ledger
            .get_balance(&user.id, withdrawal.currency)
            .await
            .map_err(repository_error("Ledger"))?;
        if available < withdrawal.amount {
            return Err(ServiceError::InsufficientFunds(format!(
                "Insufficient {} balance: available {}, requested {}",
                withdrawal.currency, available, withdrawal.amount
            )));
        }

        let withdrawal = self
            .withdrawals
            .insert_withdrawal(&user, withdrawal)
            .await
            .map_err(repository_error("Withdrawals"))?;

        log::info!(
            "Withdrawal {} requested by {}: {} {}",
            withdrawal.id,
            user.id,
            withdrawal.amount,
            withdrawal.currency
        );
        self.feed
            .publish(Collection::Withdrawals, &withdrawal.id, ChangeKind::Created);
        Ok(withdrawal)
    }

    pub async fn list_deposits(&self, filter: &TransferFilter) -> Result<Vec<Deposit>, ServiceError> {
        let status = parse_status::<DepositStatus>(filter.status.as_deref())?;

        self.deposits
            .list_deposits(status, filter.user_id.as_deref())
            .await
            .map_err(repository_error("Deposits"))
    }

    pub async fn list_withdrawals(
        &self,
        filter: &TransferFilter,
    ) -> Result<Vec<Withdrawal>, ServiceError> {
        let status = parse_status::<WithdrawalStatus>(filter.status.as_deref())?;

        self.withdrawals
            .list_withdrawals(status, filter.user_id.as_deref())
            .await
            .map_err(repository_error("Withdrawals"))
    }

    pub async fn approve_deposit(&self, id: &str, note: Option<&str>) -> Result<Deposit, ServiceError> {
        let pending = self
            .deposits
            .get_deposit(id)
            .await
            .map_err(repository_error("Deposits"))?
            .ok_or_else(|| ServiceError::NotFound(format!("deposit {}", id)))?;

        let _guard = self.locks.lock(&pending.user_id).await;
        let (deposit, entry) = self.deposits.approve_deposit(id, note).await?;

        log::info!(
            "Approved deposit {}: {} balance {} -> {}",
            deposit.id,
            entry.currency,
            entry.balance_before,
            entry.balance_after
        );
        self.settled(Collection::Deposits, &deposit.id, &entry);
        Ok(deposit)
    }

    pub async fn reject_deposit(&self, id: &str, note: Option<&str>) -> Result<Deposit, ServiceError> {
        let deposit = self.deposits.reject_deposit(id, note).await?;

        log::info!("Rejected deposit {}", deposit.id);
        self.feed.publish(Collection::Deposits, &deposit.id, ChangeKind::Updated);
        Ok(deposit)
    }

    pub async fn complete_withdrawal(
        &self,
        id: &str,
        note: Option<&str>,
    ) -> Result<Withdrawal, ServiceError> {
        let pending = self
            .withdrawals
            .get_withdrawal(id)
            .await
            .map_err(repository_error("Withdrawals"))?
            .ok_or_else(|| ServiceError::NotFound(format!("withdrawal {}", id)))?;

        let _guard = self.locks.lock(&pending.user_id).await;
        let (withdrawal, entry) = self.withdrawals.complete_withdrawal(id, note).await?;

        log::info!(
            "Completed withdrawal {}: {} balance {} -> {}",
            withdrawal.id,
            entry.currency,
            entry.balance_before,
            entry.balance_after
        );
        self.settled(Collection::Withdrawals, &withdrawal.id, &entry);
        Ok(withdrawal)
    }

    pub async fn reject_withdrawal(
        &self,
        id: &str,
        note: Option<&str>,
    ) -> Result<Withdrawal, ServiceError> {
        let withdrawal = self.withdrawals.reject_withdrawal(id, note).await?;

        log::info!("Rejected withdrawal {}", withdrawal.id);
        self.feed
            .publish(Collection::Withdrawals, &withdrawal.id, ChangeKind::Updated);
        Ok(withdrawal)
    }
}

#[async_trait]
impl RequestHandler<TransferRequest> for TransferRequestHandler {
    async fn handle_request(&self, request: TransferRequest) {
        match request {
            TransferRequest::CreateDeposit {
                user_id,
                deposit,
                response,
            } => {
                let deposit = self.create_deposit(&user_id, &deposit).await;
                let _ = response.send(deposit);
            }
            TransferRequest::CreateWithdrawal {
                user_id,
                withdrawal,
                response,
            } => {
                let withdrawal = self.create_withdrawal(&user_id, &withdrawal).await;
                let _ = response.send(withdrawal);
            }
            TransferRequest::ListDeposits { filter, response } => {
                let deposits = self.list_deposits(&filter).await;
                let _ = response.send(deposits);
            }
            TransferRequest::ListWithdrawals { filter, response } => {
                let withdrawals = self.list_withdrawals(&filter).await;
                let _ = response.send(withdrawals);
            }
            TransferRequest::ApproveDeposit { id, note, response } => {
                let result = self.approve_deposit(&id, note.as_deref()).await;
                if let Err(e) = &result {
                    log::warn!("Could not approve deposit {}: {}", id, e);
                }
                let _ = response.send(result);
            }
            TransferRequest::RejectDeposit { id, note, response } => {
                let result = self.reject_deposit(&id, note.as_deref()).await;
                let _ = response.send(result);
            }
            TransferRequest::CompleteWithdrawal { id, note, response } => {
                let result = self.complete_withdrawal(&id, note.as_deref()).await;
                if let Err(e) = &result {
                    log::warn!("Could not complete withdrawal {}: {}", id, e);
                }
                let _ = response.send(result);
            }
            TransferRequest::RejectWithdrawal { id, note, response } => {
                let result = self.reject_withdrawal(&id, note.as_deref()).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct TransferService;

impl TransferService {
    pub fn new() -> Self {
        TransferService {}
    }
}

#[async_trait]
impl Service<TransferRequest, TransferRequestHandler> for TransferService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::currency::Currency;
    use crate::models::users::NewUser;

    async fn setup() -> (TransferRequestHandler, LedgerRepository, String) {
        let pool = database::memory_pool().await;
        let user = UserRepository::new(pool.clone())
            .insert_user(&NewUser {
                id: None,
                email: "transfers@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        let handler =
            TransferRequestHandler::new(pool.clone(), UserLocks::default(), ChangeFeed::new(16));
        (handler, LedgerRepository::new(pool), user.id)
    }

    fn deposit(amount: i64) -> NewDeposit {
        NewDeposit {
            amount: Decimal::from(amount),
            currency: Currency::UsdtTrc20,
            method: "TRC20".to_string(),
            proof_url: None,
        }
    }

    #[tokio::test]
    async fn second_approval_is_an_invalid_transition() {
        let (handler, ledger, user_id) = setup().await;

        let request = handler.create_deposit(&user_id, &deposit(50)).await.unwrap();
        let approved = handler.approve_deposit(&request.id, Some("ok")).await.unwrap();
        assert_eq!(approved.status, DepositStatus::Aprobado);

        let again = handler.approve_deposit(&request.id, None).await;
        assert!(matches!(again, Err(ServiceError::InvalidTransition(_))));
        assert!(matches!(
            handler.reject_deposit(&request.id, None).await,
            Err(ServiceError::InvalidTransition(_))
        ));

        let balance = ledger.get_balance(&user_id, Currency::UsdtTrc20).await.unwrap();
        assert_eq!(balance, Decimal::from(50));
    }

    #[tokio::test]
    async fn withdrawal_requires_covering_balance() {
        let (handler, _, user_id) = setup().await;

        let result = handler
            .create_withdrawal(
                &user_id,
                &NewWithdrawal {
                    amount: Decimal::from(5),
                    currency: Currency::UsdtTrc20,
                    destination: "TXYZ".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(ServiceError::InsufficientFunds(_))));
    }

    #[tokio::test]
    async fn completion_debits_once_and_lists_by_status() {
        let (handler, ledger, user_id) = setup().await;
        let request = handler.create_deposit(&user_id, &deposit(80)).await.unwrap();
        handler.approve_deposit(&request.id, None).await.unwrap();

        let withdrawal = handler
            .create_withdrawal(
                &user_id,
                &NewWithdrawal {
                    amount: Decimal::from(30),
                    currency: Currency::UsdtTrc20,
                    destination: "TXYZ".to_string(),
                },
            )
            .await
            .unwrap();

        let pending = handler
            .list_withdrawals(&TransferFilter {
                status: Some("Pendiente".to_string()),
                user_id: None,
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        handler.complete_withdrawal(&withdrawal.id, None).await.unwrap();
        assert!(matches!(
            handler.complete_withdrawal(&withdrawal.id, None).await,
            Err(ServiceError::InvalidTransition(_))
        ));

        let balance = ledger.get_balance(&user_id, Currency::UsdtTrc20).await.unwrap();
        assert_eq!(balance, Decimal::from(50));

        assert!(matches!(
            handler
                .list_deposits(&TransferFilter {
                    status: Some("Approved".to_string()),
                    user_id: None,
                })
                .await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            handler.approve_deposit("missing", None).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
