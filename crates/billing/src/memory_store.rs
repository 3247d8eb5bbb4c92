//! In-memory reconcile store
//!
//! Backs tests and `STORE_BACKEND=memory` local runs. Every operation takes
//! the same lock, so the counter increment is atomic in the same sense the
//! SQL one is. Failure injection lets tests break individual operations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::coupon::{Coupon, CouponUsage};
use crate::error::{BillingError, BillingResult};
use crate::events::SubscriptionEvent;
use crate::store::{ReconcileStore, Subscription, SubscriptionUpdate};

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FindSubscription,
    UpdateSubscription,
    FindCoupon,
    InsertCouponUsage,
    IncrementCouponUsage,
    InsertAuditEvent,
}

#[derive(Default)]
struct Tables {
    subscriptions: HashMap<Uuid, Subscription>,
    coupons: HashMap<Uuid, Coupon>,
    coupon_usages: Vec<CouponUsage>,
    audit_events: Vec<SubscriptionEvent>,
    fail_points: HashSet<FailPoint>,
}

#[derive(Default)]
pub struct InMemoryReconcileStore {
    tables: Mutex<Tables>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryReconcileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        let mut tables = self.tables.lock().await;
        tables.subscriptions.insert(subscription.id, subscription);
    }

    pub async fn insert_coupon(&self, coupon: Coupon) {
        let mut tables = self.tables.lock().await;
        tables.coupons.insert(coupon.id, coupon);
    }

    pub async fn subscription(&self, id: Uuid) -> Option<Subscription> {
        self.tables.lock().await.subscriptions.get(&id).cloned()
    }

    pub async fn coupon(&self, id: Uuid) -> Option<Coupon> {
        self.tables.lock().await.coupons.get(&id).cloned()
    }

    pub async fn coupon_usages(&self) -> Vec<CouponUsage> {
        self.tables.lock().await.coupon_usages.clone()
    }

    pub async fn audit_events(&self) -> Vec<SubscriptionEvent> {
        self.tables.lock().await.audit_events.clone()
    }

    /// Make every later call to `point` return a database error
    pub async fn fail_on(&self, point: FailPoint) {
        self.tables.lock().await.fail_points.insert(point);
    }

    /// Number of read operations served
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write operations attempted, including failed ones
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(tables: &Tables, point: FailPoint) -> BillingResult<()> {
        if tables.fail_points.contains(&point) {
            return Err(BillingError::Database(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReconcileStore for InMemoryReconcileStore {
    async fn find_subscription(
        &self,
        customer_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) -> BillingResult<Option<Subscription>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().await;
        Self::check(&tables, FailPoint::FindSubscription)?;

        let mut matches = tables.subscriptions.values().filter(|sub| {
            let by_customer = customer_id.is_some()
                && sub.gateway_customer_id.as_deref() == customer_id;
            let by_subscription = gateway_subscription_id.is_some()
                && sub.gateway_subscription_id.as_deref() == gateway_subscription_id;
            by_customer || by_subscription
        });

        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(BillingError::DataIntegrity(
                "multiple subscriptions match the gateway identifiers".to_string(),
            ));
        }
        Ok(first)
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        update: SubscriptionUpdate,
    ) -> BillingResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        Self::check(&tables, FailPoint::UpdateSubscription)?;

        let sub = tables
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", id)))?;

        sub.status = update.status;
        sub.updated_at = update.updated_at;
        if update.clear_pending_coupon {
            sub.pending_coupon = None;
        }
        if let Some(period_end) = update.current_period_end {
            sub.current_period_end = Some(period_end);
        }
        if sub.gateway_subscription_id.is_none() {
            if let Some(linkage) = update.gateway_subscription_id {
                sub.gateway_subscription_id = Some(linkage);
            }
        }
        Ok(())
    }

    async fn find_coupon(&self, code_upper: &str) -> BillingResult<Option<Coupon>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().await;
        Self::check(&tables, FailPoint::FindCoupon)?;

        Ok(tables
            .coupons
            .values()
            .find(|c| c.code.to_uppercase() == code_upper)
            .cloned())
    }

    async fn insert_coupon_usage(&self, usage: &CouponUsage) -> BillingResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        Self::check(&tables, FailPoint::InsertCouponUsage)?;
        tables.coupon_usages.push(usage.clone());
        Ok(())
    }

    async fn increment_coupon_usage_counter(&self, coupon_id: Uuid) -> BillingResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        Self::check(&tables, FailPoint::IncrementCouponUsage)?;

        let coupon = tables
            .coupons
            .get_mut(&coupon_id)
            .ok_or_else(|| BillingError::NotFound(format!("coupon {}", coupon_id)))?;
        coupon.usage_count += 1;
        Ok(())
    }

    async fn insert_audit_event(&self, event: &SubscriptionEvent) -> BillingResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        Self::check(&tables, FailPoint::InsertAuditEvent)?;
        tables.audit_events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SubscriptionStatus;
    use time::OffsetDateTime;

    fn sub(customer: &str, gateway_sub: Option<&str>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            gateway_customer_id: Some(customer.to_string()),
            gateway_subscription_id: gateway_sub.map(str::to_string),
            status: SubscriptionStatus::Active,
            current_period_end: None,
            pending_coupon: None,
            plan_name: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_find_matches_either_key() {
        let store = InMemoryReconcileStore::new();
        let row = sub("cus_1", Some("sub_1"));
        store.insert_subscription(row.clone()).await;

        let by_customer = store.find_subscription(Some("cus_1"), None).await.unwrap();
        assert_eq!(by_customer.map(|s| s.id), Some(row.id));

        let by_sub = store
            .find_subscription(Some("cus_other"), Some("sub_1"))
            .await
            .unwrap();
        assert_eq!(by_sub.map(|s| s.id), Some(row.id));

        assert!(store.find_subscription(None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_rejects_ambiguous_match() {
        let store = InMemoryReconcileStore::new();
        store.insert_subscription(sub("cus_1", None)).await;
        store.insert_subscription(sub("cus_2", Some("sub_2"))).await;

        let result = store.find_subscription(Some("cus_1"), Some("sub_2")).await;
        assert!(matches!(result, Err(BillingError::DataIntegrity(_))));
    }

    #[tokio::test]
    async fn test_update_never_overwrites_linkage() {
        let store = InMemoryReconcileStore::new();
        let row = sub("cus_1", Some("sub_original"));
        store.insert_subscription(row.clone()).await;

        store
            .update_subscription(
                row.id,
                SubscriptionUpdate {
                    status: SubscriptionStatus::PastDue,
                    updated_at: OffsetDateTime::now_utc(),
                    clear_pending_coupon: false,
                    current_period_end: None,
                    gateway_subscription_id: Some("sub_new".to_string()),
                },
            )
            .await
            .unwrap();

        let stored = store.subscription(row.id).await.unwrap();
        assert_eq!(stored.gateway_subscription_id.as_deref(), Some("sub_original"));
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryReconcileStore::new());
        let coupon_id = Uuid::new_v4();
        store
            .insert_coupon(Coupon {
                id: coupon_id,
                code: "SAVE10".to_string(),
                discount_type: crate::coupon::CouponType::Percentage,
                discount_value: 10.0,
                usage_count: 0,
            })
            .await;

        let mut handles = vec![];
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.increment_coupon_usage_counter(coupon_id).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.coupon(coupon_id).await.unwrap().usage_count, 20);
    }
}
