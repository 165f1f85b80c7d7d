use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::ledger::UserLocks;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::content::{VipPlan, VipPlanInput};
use crate::models::feed::{ChangeKind, Collection};
use crate::models::users::{User, VipTier};
use crate::repositories::users::UserRepository;
use crate::repositories::vip::{VipRepository, MAX_VIP_DAYS};

pub enum VipRequest {
    ListPlans {
        active_only: bool,
        response: Reply<Vec<VipPlan>>,
    },
    CreatePlan {
        plan: VipPlanInput,
        response: Reply<VipPlan>,
    },
    UpdatePlan {
        id: String,
        plan: VipPlanInput,
        response: Reply<VipPlan>,
    },
    DeletePlan {
        id: String,
        response: Reply<()>,
    },
    GrantVip {
        user_id: String,
        tier: VipTier,
        days: i64,
        response: Reply<User>,
    },
    PurchasePlan {
        user_id: String,
        plan_id: String,
        response: Reply<User>,
    },
}

#[derive(Clone)]
pub struct VipRequestHandler {
    repository: VipRepository,
    users: UserRepository,
    locks: UserLocks,
    feed: ChangeFeed,
}

fn repository_error(e: anyhow::Error) -> ServiceError {
    ServiceError::Repository("VIP".to_string(), e.to_string())
}

fn validate_plan(plan: &VipPlanInput) -> Result<(), ServiceError> {
    if plan.name.trim().is_empty() {
        return Err(ServiceError::Validation("plan name is required".to_string()));
    }
    if plan.tier == VipTier::None {
        return Err(ServiceError::Validation("plan tier must be a VIP tier".to_string()));
    }
    if plan.price < Decimal::ZERO {
        return Err(ServiceError::Validation("plan price must not be negative".to_string()));
    }
    if plan.duration_days <= 0 || plan.duration_days > MAX_VIP_DAYS {
        return Err(ServiceError::Validation(format!(
            "plan duration must be between 1 and {} days",
            MAX_VIP_DAYS
        )));
    }
    Ok(())
}

impl VipRequestHandler {
    pub fn new(sql_conn: SqlitePool, locks: UserLocks, feed: ChangeFeed) -> Self {
        Self {
            repository: VipRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn),
            locks,
            feed,
        }
    }

    pub async fn start_expiry_sweep(&self, every: Duration) {
        let handler = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;

                match handler.expire_memberships().await {
                    Ok(0) => {}
                    Ok(count) => log::info!("Expired {} VIP memberships.", count),
                    Err(e) => log::error!("Error expiring VIP memberships: {}", e),
                }
            }
        });

        log::info!("VIP expiry sweep started");
    }

    pub async fn expire_memberships(&self) -> Result<usize, ServiceError> {
        let expired = self
            .users
            .expire_vip(Utc::now())
            .await
            .map_err(|e| ServiceError::Repository("Users".to_string(), e.to_string()))?;

        for user_id in &expired {
            self.feed.publish(Collection::Users, user_id, ChangeKind::Updated);
        }
        Ok(expired.len())
    }

    pub async fn list_plans(&self, active_only: bool) -> Result<Vec<VipPlan>, ServiceError> {
        self.repository
            .list_plans(active_only)
            .await
            .map_err(repository_error)
    }

    pub async fn create_plan(&self, plan: &VipPlanInput) -> Result<VipPlan, ServiceError> {
        validate_plan(plan)?;

        let plan = self.repository.insert_plan(plan).await.map_err(repository_error)?;
        self.feed.publish(Collection::VipPlans, &plan.id, ChangeKind::Created);
        Ok(plan)
    }

    pub async fn update_plan(&self, id: &str, plan: &VipPlanInput) -> Result<VipPlan, ServiceError> {
        validate_plan(plan)?;

        let plan = self
            .repository
            .update_plan(id, plan)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("plan {}", id)))?;

        self.feed.publish(Collection::VipPlans, &plan.id, ChangeKind::Updated);
        Ok(plan)
    }

    pub async fn delete_plan(&self, id: &str) -> Result<(), ServiceError> {
        if !self.repository.delete_plan(id).await.map_err(repository_error)? {
            return Err(ServiceError::NotFound(format!("plan {}", id)));
        }

        self.feed.publish(Collection::VipPlans, id, ChangeKind::Deleted);
        Ok(())
    }

    pub async fn grant(&self, user_id: &str, tier: VipTier, days: i64) -> Result<User, ServiceError> {
        if tier != VipTier::None && !(1..=MAX_VIP_DAYS).contains(&days) {
            return Err(ServiceError::Validation(format!(
                "days must be between 1 and {}",
                MAX_VIP_DAYS
            )));
        }

        let user = self
            .repository
            .grant(user_id, tier, days)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;

        log::info!("Granted {} to {} for {} days", tier, user_id, days);
        self.feed.publish(Collection::Users, user_id, ChangeKind::Updated);
        Ok(user)
    }

    pub async fn purchase(&self, user_id: &str, plan_id: &str) -> Result<User, ServiceError> {
        let _guard = self.locks.lock(user_id).await;

        let (user, entry) = self.repository.purchase(user_id, plan_id).await?;

        log::info!(
            "User {} bought plan {} for {} USD, {} until {:?}",
            user_id,
            plan_id,
            entry.amount,
            user.vip_status,
            user.vip_expires_at
        );
        self.feed.publish(Collection::Ledger, &entry.id, ChangeKind::Created);
        self.feed.publish(Collection::Users, user_id, ChangeKind::Updated);
        Ok(user)
    }
}

#[async_trait]
impl RequestHandler<VipRequest> for VipRequestHandler {
    async fn handle_request(&self, request: VipRequest) {
        match request {
            VipRequest::ListPlans {
                active_only,
                response,
            } => {
                let plans = self.list_plans(active_only).await;
                let _ = response.send(plans);
            }
            VipRequest::CreatePlan { plan, response } => {
                let plan = self.create_plan(&plan).await;
                let _ = response.send(plan);
            }
            VipRequest::UpdatePlan { id, plan, response } => {
                let plan = self.update_plan(&id, &plan).await;
                let _ = response.send(plan);
            }
            VipRequest::DeletePlan { id, response } => {
                let result = self.delete_plan(&id).await;
                let _ = response.send(result);
            }
            VipRequest::GrantVip {
                user_id,
                tier,
                days,
                response,
            } => {
                let user = self.grant(&user_id, tier, days).await;
                let _ = response.send(user);
            }
            VipRequest::PurchasePlan {
                user_id,
                plan_id,
                response,
            } => {
                let result = self.purchase(&user_id, &plan_id).await;
                if let Err(e) = &result {
                    log::warn!("VIP purchase by {} failed: {}", user_id, e);
                }
                let _ = response.send(result);
            }
        }
    }
}

pub struct VipService;

impl VipService {
    pub fn new() -> Self {
        VipService {}
    }
}

#[async_trait]
impl Service<VipRequest, VipRequestHandler> for VipService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::currency::Currency;
    use crate::models::ledger::{BalanceAdjustment, BalanceOperation};
    use crate::models::users::NewUser;
    use crate::repositories::ledger::LedgerRepository;

    async fn setup() -> (VipRequestHandler, SqlitePool, String) {
        let pool = database::memory_pool().await;
        let user = UserRepository::new(pool.clone())
            .insert_user(&NewUser {
                id: None,
                email: "vip@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        let handler = VipRequestHandler::new(pool.clone(), UserLocks::default(), ChangeFeed::new(16));
        (handler, pool, user.id)
    }

    fn gold_plan(active: bool) -> VipPlanInput {
        VipPlanInput {
            tier: VipTier::Gold,
            name: "Gold".to_string(),
            price: Decimal::from(25),
            duration_days: 30,
            features: vec!["signals".to_string()],
            active,
        }
    }

    #[tokio::test]
    async fn purchase_requires_funds_and_active_plan() {
        let (handler, pool, user_id) = setup().await;
        let plan = handler.create_plan(&gold_plan(true)).await.unwrap();

        assert!(matches!(
            handler.purchase(&user_id, &plan.id).await,
            Err(ServiceError::InsufficientFunds(_))
        ));

        LedgerRepository::new(pool)
            .adjust(
                &user_id,
                &BalanceAdjustment {
                    currency: Currency::Usd,
                    amount: Decimal::from(30),
                    operation: BalanceOperation::Add,
                    reason: None,
                },
            )
            .await
            .unwrap();

        let user = handler.purchase(&user_id, &plan.id).await.unwrap();
        assert_eq!(user.vip_status, VipTier::Gold);
        assert_eq!(user.balances.get(Currency::Usd), Decimal::from(5));

        let inactive = handler.create_plan(&gold_plan(false)).await.unwrap();
        assert!(matches!(
            handler.purchase(&user_id, &inactive.id).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            handler.purchase(&user_id, "missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(handler.list_plans(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_resets_lapsed_grants() {
        let (handler, _, user_id) = setup().await;

        let user = handler.grant(&user_id, VipTier::Diamond, 10).await.unwrap();
        assert_eq!(user.vip_status, VipTier::Diamond);
        assert_eq!(handler.expire_memberships().await.unwrap(), 0);

        // A zero-day grant is rejected, so force expiry through the repository.
        handler
            .users
            .expire_vip(Utc::now() + chrono::Duration::days(11))
            .await
            .unwrap();
        let user = handler.users.get_user_by_id(&user_id).await.unwrap().unwrap();
        assert_eq!(user.vip_status, VipTier::None);
        assert_eq!(user.vip_expires_at, None);

        assert!(matches!(
            handler.grant("missing", VipTier::Gold, 5).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn oversized_grants_are_rejected() {
        let (handler, _, user_id) = setup().await;

        assert!(matches!(
            handler.grant(&user_id, VipTier::Gold, 1_000_000_000_000).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            handler.grant(&user_id, VipTier::Gold, MAX_VIP_DAYS + 1).await,
            Err(ServiceError::Validation(_))
        ));

        let user = handler.grant(&user_id, VipTier::Gold, MAX_VIP_DAYS).await.unwrap();
        assert_eq!(user.vip_status, VipTier::Gold);
    }

    #[test]
    fn plans_need_a_vip_tier_and_duration() {
        let mut plan = gold_plan(true);
        plan.tier = VipTier::None;
        assert!(validate_plan(&plan).is_err());

        let mut plan = gold_plan(true);
        plan.duration_days = 0;
        assert!(validate_plan(&plan).is_err());

        plan.duration_days = MAX_VIP_DAYS + 1;
        assert!(validate_plan(&plan).is_err());
        assert!(validate_plan(&gold_plan(true)).is_ok());
    }
}
