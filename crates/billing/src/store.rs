//! Persistence contract for webhook reconciliation
//!
//! The reconciler never talks to a database directly; it is handed a
//! [`ReconcileStore`]. Production uses [`crate::pg_store::PgReconcileStore`],
//! tests and local runs use [`crate::memory_store::InMemoryReconcileStore`].

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::coupon::{Coupon, CouponUsage};
use crate::error::BillingResult;
use crate::events::SubscriptionEvent;
use crate::status::SubscriptionStatus;

/// A tenant's billing relationship with the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<OffsetDateTime>,
    pub pending_coupon: Option<String>,
    pub plan_name: Option<String>,
    pub updated_at: OffsetDateTime,
}

/// Fields written back after an event is reconciled
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub status: SubscriptionStatus,
    pub updated_at: OffsetDateTime,
    /// Set `pending_coupon` to null. It is never set to a new value here.
    pub clear_pending_coupon: bool,
    /// `None` leaves the stored period end untouched
    pub current_period_end: Option<OffsetDateTime>,
    /// Only written when the stored linkage is null
    pub gateway_subscription_id: Option<String>,
}

#[async_trait]
pub trait ReconcileStore: Send + Sync {
    /// Find the one subscription matching either gateway key.
    ///
    /// More than one match is a `DataIntegrity` error, never a silent pick.
    async fn find_subscription(
        &self,
        customer_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) -> BillingResult<Option<Subscription>>;

    /// Apply a single-row update keyed by internal id
    async fn update_subscription(&self, id: Uuid, update: SubscriptionUpdate)
        -> BillingResult<()>;

    /// Look up a coupon by its upper-cased code
    async fn find_coupon(&self, code_upper: &str) -> BillingResult<Option<Coupon>>;

    async fn insert_coupon_usage(&self, usage: &CouponUsage) -> BillingResult<()>;

    /// Atomic store-side `usage_count + 1`
    async fn increment_coupon_usage_counter(&self, coupon_id: Uuid) -> BillingResult<()>;

    async fn insert_audit_event(&self, event: &SubscriptionEvent) -> BillingResult<()>;
}
