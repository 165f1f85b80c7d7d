use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};

use super::ledger::{self, LedgerError};
use super::users::{fetch_user, set_vip};
use super::{decimal_column, new_id, parse_column};
use crate::models::content::{VipPlan, VipPlanInput};
use crate::models::currency::Currency;
use crate::models::ledger::{BalanceAdjustment, BalanceOperation, LedgerEntry};
use crate::models::users::{User, VipTier};

impl<'r> FromRow<'r, SqliteRow> for VipPlan {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let features: String = row.try_get("features")?;
        let features = serde_json::from_str(&features).map_err(|e| sqlx::Error::ColumnDecode {
            index: "features".to_string(),
            source: Box::new(e),
        })?;

        Ok(VipPlan {
            id: row.try_get("id")?,
            tier: parse_column(row, "tier")?,
            name: row.try_get("name")?,
            price: decimal_column(row, "price")?,
            duration_days: row.try_get("duration_days")?,
            features,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Plan not found: {0}")]
    UnknownPlan(String),
    #[error("Plan is not available: {0}")]
    InactivePlan(String),
    #[error("VIP duration of {0} days is out of range")]
    DurationOutOfRange(i64),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Longest membership a single grant or plan may cover.
pub const MAX_VIP_DAYS: i64 = 36_500;

/// `days` after `start`, or `None` when that is not a representable date.
pub fn expiry_after(start: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|duration| start.checked_add_signed(duration))
}

/// New expiry for `days` of `tier`. Renewing the tier a user already
/// holds stacks on top of the remaining time.
pub fn extended_expiry(
    user: &User,
    tier: VipTier,
    days: i64,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let start = match user.vip_expires_at {
        Some(expires_at) if user.vip_status == tier && expires_at > now => expires_at,
        _ => now,
    };

    expiry_after(start, days)
}

#[derive(Clone)]
pub struct VipRepository {
    conn: SqlitePool,
}

impl VipRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn insert_plan(&self, plan: &VipPlanInput) -> Result<VipPlan, anyhow::Error> {
        let now = Utc::now();

        let plan = sqlx::query_as::<_, VipPlan>(
            r#"
                INSERT INTO vip_plans
                (id, tier, name, price, duration_days, features, active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(plan.tier.as_str())
        .bind(&plan.name)
        .bind(plan.price.normalize().to_string())
        .bind(plan.duration_days)
        .bind(serde_json::to_string(&plan.features)?)
        .bind(plan.active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(plan)
    }

    pub async fn update_plan(
        &self,
        id: &str,
        plan: &VipPlanInput,
    ) -> Result<Option<VipPlan>, anyhow::Error> {
        let plan = sqlx::query_as::<_, VipPlan>(
            r#"
                UPDATE vip_plans
                SET tier = ?, name = ?, price = ?, duration_days = ?, features = ?, active = ?, updated_at = ?
                WHERE id = ?
                RETURNING *
            "#,
        )
        .bind(plan.tier.as_str())
        .bind(&plan.name)
        .bind(plan.price.normalize().to_string())
        .bind(plan.duration_days)
        .bind(serde_json::to_string(&plan.features)?)
        .bind(plan.active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(plan)
    }

    pub async fn get_plan(&self, id: &str) -> Result<Option<VipPlan>, anyhow::Error> {
        let plan = sqlx::query_as::<_, VipPlan>("SELECT * FROM vip_plans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(plan)
    }

    pub async fn list_plans(&self, active_only: bool) -> Result<Vec<VipPlan>, anyhow::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM vip_plans");
        if active_only {
            query.push(" WHERE active = 1");
        }
        query.push(" ORDER BY CAST(price AS REAL) ASC");

        let plans = query.build_query_as::<VipPlan>().fetch_all(&self.conn).await?;
        Ok(plans)
    }

    pub async fn delete_plan(&self, id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM vip_plans WHERE id = ?")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn grant(
        &self,
        user_id: &str,
        tier: VipTier,
        days: i64,
    ) -> Result<Option<User>, anyhow::Error> {
        let expires_at = match tier {
            VipTier::None => None,
            _ => Some(
                expiry_after(Utc::now(), days)
                    .ok_or_else(|| anyhow::anyhow!("VIP duration of {} days is out of range", days))?,
            ),
        };

        let mut tx = self.conn.begin().await?;
        if !set_vip(&mut tx, user_id, tier, expires_at).await? {
            return Ok(None);
        }
        let user = fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Charges the plan price to `balanceUSD` and sets the tier in one
    /// transaction.
    pub async fn purchase(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<(User, LedgerEntry), PurchaseError> {
        let mut tx = self.conn.begin_with("BEGIN IMMEDIATE").await?;

        let plan = sqlx::query_as::<_, VipPlan>("SELECT * FROM vip_plans WHERE id = ?")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PurchaseError::UnknownPlan(plan_id.to_string()))?;
        if !plan.active {
            return Err(PurchaseError::InactivePlan(plan_id.to_string()));
        }

        let entry = ledger::apply(
            &mut tx,
            user_id,
            &BalanceAdjustment {
                currency: Currency::Usd,
                amount: plan.price,
                operation: BalanceOperation::Subtract,
                reason: Some(format!("VIP plan {}", plan.name)),
            },
            Some(&plan.id),
        )
        .await?;

        let user = fetch_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;
        let expires_at = extended_expiry(&user, plan.tier, plan.duration_days, Utc::now())
            .ok_or(PurchaseError::DurationOutOfRange(plan.duration_days))?;
        set_vip(&mut tx, user_id, plan.tier, Some(expires_at)).await?;

        let user = fetch_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;
        tx.commit().await?;

        Ok((user, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::users::NewUser;
    use crate::repositories::ledger::LedgerRepository;
    use crate::repositories::users::UserRepository;
    use crate::settings;
    use rust_decimal::Decimal;

    async fn setup(funds: &str) -> (VipRepository, LedgerRepository, User) {
        let pool = database::memory_pool().await;
        let user = UserRepository::new(pool.clone())
            .insert_user(&NewUser {
                id: None,
                email: "vip@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        let ledger = LedgerRepository::new(pool.clone());
        ledger
            .adjust(
                &user.id,
                &BalanceAdjustment {
                    currency: Currency::Usd,
                    amount: funds.parse().unwrap(),
                    operation: BalanceOperation::Add,
                    reason: None,
                },
            )
            .await
            .unwrap();

        (VipRepository::new(pool), ledger, user)
    }

    fn gold_plan(active: bool) -> VipPlanInput {
        VipPlanInput {
            tier: VipTier::Gold,
            name: "Gold monthly".to_string(),
            price: "49.99".parse().unwrap(),
            duration_days: 30,
            features: vec!["signals".to_string(), "chat".to_string()],
            active,
        }
    }

    #[tokio::test]
    async fn purchase_debits_usd_and_sets_tier() {
        let (repository, ledger, user) = setup("100").await;
        let plan = repository.insert_plan(&gold_plan(true)).await.unwrap();
        assert_eq!(plan.features.len(), 2);

        let (upgraded, entry) = repository.purchase(&user.id, &plan.id).await.unwrap();

        assert_eq!(upgraded.vip_status, VipTier::Gold);
        assert!(upgraded.vip_expires_at.unwrap() > Utc::now() + Duration::days(29));
        assert_eq!(entry.reference.as_deref(), Some(plan.id.as_str()));
        assert_eq!(
            ledger.get_balance(&user.id, Currency::Usd).await.unwrap(),
            "50.01".parse::<Decimal>().unwrap()
        );
    }

    #[tokio::test]
    async fn renewal_stacks_on_remaining_time() {
        let (repository, _, user) = setup("100").await;
        let plan = repository.insert_plan(&gold_plan(true)).await.unwrap();

        repository.purchase(&user.id, &plan.id).await.unwrap();
        let (renewed, _) = repository.purchase(&user.id, &plan.id).await.unwrap();

        assert!(renewed.vip_expires_at.unwrap() > Utc::now() + Duration::days(59));
    }

    #[tokio::test]
    async fn purchase_fails_without_funds_or_active_plan() {
        let (repository, ledger, user) = setup("10").await;
        let plan = repository.insert_plan(&gold_plan(true)).await.unwrap();
        let retired = repository.insert_plan(&gold_plan(false)).await.unwrap();

        assert!(matches!(
            repository.purchase(&user.id, &plan.id).await,
            Err(PurchaseError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));
        assert!(matches!(
            repository.purchase(&user.id, &retired.id).await,
            Err(PurchaseError::InactivePlan(_))
        ));
        assert!(matches!(
            repository.purchase(&user.id, "missing").await,
            Err(PurchaseError::UnknownPlan(_))
        ));
        assert_eq!(
            ledger.get_balance(&user.id, Currency::Usd).await.unwrap(),
            Decimal::from(10)
        );

        let plans = repository.list_plans(true).await.unwrap();
        assert_eq!(plans.len(), 1);
    }

    #[tokio::test]
    async fn unrepresentable_duration_rolls_back_the_charge() {
        let (repository, ledger, user) = setup("100").await;
        let mut endless = gold_plan(true);
        endless.duration_days = 1_000_000_000_000;
        let plan = repository.insert_plan(&endless).await.unwrap();

        assert!(matches!(
            repository.purchase(&user.id, &plan.id).await,
            Err(PurchaseError::DurationOutOfRange(_))
        ));
        assert_eq!(
            ledger.get_balance(&user.id, Currency::Usd).await.unwrap(),
            Decimal::from(100)
        );
        assert!(repository.grant(&user.id, VipTier::Gold, i64::MAX).await.is_err());
        assert!(expiry_after(Utc::now(), MAX_VIP_DAYS).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn purchases_succeed_alongside_other_writers() {
        let path = std::env::temp_dir().join(format!("copydesk-{}.db", new_id()));
        let pool = database::connect(&settings::Database {
            url: format!("sqlite://{}", path.display()),
            max_connections: 4,
        })
        .await
        .unwrap();
        let users = UserRepository::new(pool.clone());
        let ledger = LedgerRepository::new(pool.clone());
        let repository = VipRepository::new(pool.clone());
        let plan = repository.insert_plan(&gold_plan(true)).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..8 {
            let user = users
                .insert_user(&NewUser {
                    id: None,
                    email: format!("busy{}@example.com", i),
                    display_name: None,
                })
                .await
                .unwrap();
            ids.push(user.id);
        }

        let credit = BalanceAdjustment {
            currency: Currency::Usd,
            amount: Decimal::from(100),
            operation: BalanceOperation::Add,
            reason: None,
        };
        for id in &ids[..4] {
            ledger.adjust(id, &credit).await.unwrap();
        }

        let mut tasks = Vec::new();
        for (i, id) in ids.iter().cloned().enumerate() {
            let (repository, ledger, users) = (repository.clone(), ledger.clone(), users.clone());
            let (plan_id, credit) = (plan.id.clone(), credit.clone());
            tasks.push(tokio::spawn(async move {
                if i < 4 {
                    repository.purchase(&id, &plan_id).await.map(|_| ()).map_err(|e| e.to_string())
                } else {
                    users.expire_vip(Utc::now()).await.map_err(|e| e.to_string())?;
                    ledger.adjust(&id, &credit).await.map(|_| ()).map_err(|e| e.to_string())
                }
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(()));
        }
        for id in &ids[..4] {
            let user = users.get_user_by_id(id).await.unwrap().unwrap();
            assert_eq!(user.vip_status, VipTier::Gold);
        }

        pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn grant_sets_tier_from_now() {
        let (repository, _, user) = setup("0").await;

        let granted = repository
            .grant(&user.id, VipTier::Diamond, 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(granted.vip_status, VipTier::Diamond);

        let revoked = repository
            .grant(&user.id, VipTier::None, 0)
            .await
            .unwrap()
            .unwrap();
        assert!(revoked.vip_expires_at.is_none());
        assert!(repository.grant("missing", VipTier::Gold, 1).await.unwrap().is_none());
    }
}
