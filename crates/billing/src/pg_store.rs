//! PostgreSQL reconcile store

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::coupon::{Coupon, CouponUsage};
use crate::error::{BillingError, BillingResult};
use crate::events::SubscriptionEvent;
use crate::store::{ReconcileStore, Subscription, SubscriptionUpdate};

/// Row type for subscription lookups
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    gateway_customer_id: Option<String>,
    gateway_subscription_id: Option<String>,
    status: String,
    current_period_end: Option<OffsetDateTime>,
    pending_coupon: Option<String>,
    plan_name: Option<String>,
    updated_at: OffsetDateTime,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            gateway_customer_id: row.gateway_customer_id,
            gateway_subscription_id: row.gateway_subscription_id,
            status: row.status.parse()?,
            current_period_end: row.current_period_end,
            pending_coupon: row.pending_coupon,
            plan_name: row.plan_name,
            updated_at: row.updated_at,
        })
    }
}

/// Row type for coupon lookups
#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: f64,
    usage_count: i64,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = BillingError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Coupon {
            id: row.id,
            code: row.code,
            discount_type: row.discount_type.parse()?,
            discount_value: row.discount_value,
            usage_count: row.usage_count,
        })
    }
}

#[derive(Clone)]
pub struct PgReconcileStore {
    pool: PgPool,
}

impl PgReconcileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconcileStore for PgReconcileStore {
    async fn find_subscription(
        &self,
        customer_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) -> BillingResult<Option<Subscription>> {
        // LIMIT 2 is enough to tell "exactly one" from "ambiguous"
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, gateway_customer_id, gateway_subscription_id, status,
                   current_period_end, pending_coupon, plan_name, updated_at
            FROM subscriptions
            WHERE ($1::TEXT IS NOT NULL AND gateway_customer_id = $1)
               OR ($2::TEXT IS NOT NULL AND gateway_subscription_id = $2)
            LIMIT 2
            "#,
        )
        .bind(customer_id)
        .bind(gateway_subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to look up subscription");
            BillingError::Database(e.to_string())
        })?;

        if rows.len() > 1 {
            return Err(BillingError::DataIntegrity(format!(
                "multiple subscriptions match customer {:?} / subscription {:?}",
                customer_id, gateway_subscription_id
            )));
        }

        rows.into_iter().next().map(Subscription::try_from).transpose()
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        update: SubscriptionUpdate,
    ) -> BillingResult<()> {
        // COALESCE keeps the period end when none was sent and keeps an
        // existing gateway linkage even if a different one arrives.
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2,
                updated_at = $3,
                pending_coupon = CASE WHEN $4 THEN NULL ELSE pending_coupon END,
                current_period_end = COALESCE($5, current_period_end),
                gateway_subscription_id = COALESCE(gateway_subscription_id, $6)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.updated_at)
        .bind(update.clear_pending_coupon)
        .bind(update.current_period_end)
        .bind(update.gateway_subscription_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("subscription {}", id)));
        }

        Ok(())
    }

    async fn find_coupon(&self, code_upper: &str) -> BillingResult<Option<Coupon>> {
        let row: Option<CouponRow> = sqlx::query_as(
            r#"
            SELECT id, code, discount_type, discount_value::FLOAT8 AS discount_value,
                   usage_count::INT8 AS usage_count
            FROM coupons
            WHERE UPPER(code) = $1
            "#,
        )
        .bind(code_upper)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Coupon::try_from).transpose()
    }

    async fn insert_coupon_usage(&self, usage: &CouponUsage) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coupon_usages
                (coupon_id, user_id, subscription_id, original_amount, discount_amount, final_amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(usage.coupon_id)
        .bind(usage.user_id)
        .bind(usage.subscription_id)
        .bind(usage.original_amount)
        .bind(usage.discount_amount)
        .bind(usage.final_amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_coupon_usage_counter(&self, coupon_id: Uuid) -> BillingResult<()> {
        let result = sqlx::query(
            "UPDATE coupons SET usage_count = COALESCE(usage_count, 0) + 1 WHERE id = $1",
        )
        .bind(coupon_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("coupon {}", coupon_id)));
        }

        Ok(())
    }

    async fn insert_audit_event(&self, event: &SubscriptionEvent) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_events (user_id, event_type, description, plan_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.description)
        .bind(&event.plan_name)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
