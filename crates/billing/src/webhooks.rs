//! Payment gateway webhook reconciliation
//!
//! Each inbound gateway notification is mapped onto the matching subscription
//! row. Deliveries are at-least-once and unordered, so everything here is
//! written to be safe to replay:
//!
//! - status and period end are plain overwrites of the same values
//! - `pending_coupon` is cleared on every confirmed payment, which makes the
//!   coupon redemption at-most-once per pending coupon
//! - gateway linkage is only ever backfilled, never replaced
//!
//! Payloads that can't be interpreted are acknowledged rather than rejected so
//! the gateway stops redelivering them.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::coupon::{redeem_pending_coupon, CouponOutcome};
use crate::error::{BillingError, BillingResult};
use crate::events::{describe_gateway_event, SubscriptionEventBuilder, SubscriptionEventLogger};
use crate::payload::{extract_fields, resolve_target};
use crate::status::{is_confirmed_payment, map_gateway_status, SubscriptionStatus};
use crate::store::{ReconcileStore, SubscriptionUpdate};

/// Result of a sub-task whose failure is logged and dropped
pub type NonFatal<T> = Result<T, String>;

/// What the reconciler did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Neither `payment`, `subscription` nor a top-level object with an `id`
    NoTargetObject,
    /// Target found, but no customer id and no subscription id
    NoIdentifiers,
    /// Identifiers didn't match any subscription; nothing was written
    SubscriptionNotFound {
        customer_id: Option<String>,
        gateway_subscription_id: Option<String>,
    },
    Applied(ReconcileSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSummary {
    pub subscription_id: Uuid,
    pub status: SubscriptionStatus,
    pub confirmed_payment: bool,
    pub coupon: CouponOutcome,
    pub audit_logged: bool,
}

/// Webhook handler for gateway payment events
#[derive(Clone)]
pub struct WebhookHandler {
    store: Arc<dyn ReconcileStore>,
    event_logger: SubscriptionEventLogger,
    access_token: Option<String>,
}

impl WebhookHandler {
    /// `access_token` of `None` (or empty) means open mode: no header check.
    pub fn new(store: Arc<dyn ReconcileStore>, access_token: Option<String>) -> Self {
        let event_logger = SubscriptionEventLogger::new(store.clone());
        Self {
            store,
            event_logger,
            access_token: access_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_open_mode(&self) -> bool {
        self.access_token.is_none()
    }

    /// Check the shared-secret header against the configured token.
    pub fn authorize(&self, provided: Option<&str>) -> BillingResult<()> {
        let Some(expected) = &self.access_token else {
            return Ok(());
        };

        let matches = provided
            .map(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            tracing::warn!(
                header_present = provided.is_some(),
                "Rejected webhook with invalid access token"
            );
            Err(BillingError::Unauthorized)
        }
    }

    /// Reconcile one event.
    ///
    /// `Err` is only returned for fatal failures: the subscription lookup or
    /// the subscription update.
    pub async fn reconcile(&self, body: &Value) -> BillingResult<WebhookOutcome> {
        let Some(target) = resolve_target(body) else {
            tracing::info!("Webhook has no target object, acknowledging");
            return Ok(WebhookOutcome::NoTargetObject);
        };

        let fields = extract_fields(body, &target);
        let event = fields.event.as_deref();

        tracing::info!(
            event = ?event,
            target = ?target.source,
            customer_id = ?fields.customer_id,
            gateway_subscription_id = ?fields.gateway_subscription_id,
            status = ?fields.status,
            "Processing gateway webhook"
        );

        if !fields.has_identifiers() {
            tracing::info!(event = ?event, "Webhook carries no identifiers, acknowledging");
            return Ok(WebhookOutcome::NoIdentifiers);
        }

        let subscription = self
            .store
            .find_subscription(
                fields.customer_id.as_deref(),
                fields.gateway_subscription_id.as_deref(),
            )
            .await?;

        let Some(subscription) = subscription else {
            tracing::warn!(
                event = ?event,
                customer_id = ?fields.customer_id,
                gateway_subscription_id = ?fields.gateway_subscription_id,
                "No subscription matches webhook identifiers"
            );
            return Ok(WebhookOutcome::SubscriptionNotFound {
                customer_id: fields.customer_id.clone(),
                gateway_subscription_id: fields.gateway_subscription_id.clone(),
            });
        };

        let status = map_gateway_status(fields.status.as_deref());
        let confirmed_payment = is_confirmed_payment(event);

        let coupon = match (&subscription.pending_coupon, confirmed_payment) {
            (Some(code), true) => {
                match run_non_fatal(
                    "coupon_redemption",
                    redeem_pending_coupon(self.store.as_ref(), code, &subscription, &fields),
                )
                .await
                {
                    Ok(Some(usage)) => CouponOutcome::Redeemed(usage),
                    Ok(None) => {
                        tracing::warn!(
                            code = %code,
                            subscription_id = %subscription.id,
                            "Pending coupon not found, clearing it anyway"
                        );
                        CouponOutcome::CouponNotFound(code.clone())
                    }
                    Err(message) => CouponOutcome::Failed(message),
                }
            }
            _ => CouponOutcome::NotApplicable,
        };

        let backfill = if subscription.gateway_subscription_id.is_none()
            && fields.supplies_subscription_link(target.source)
        {
            fields.gateway_subscription_id.clone()
        } else {
            None
        };

        let update = SubscriptionUpdate {
            status,
            updated_at: OffsetDateTime::now_utc(),
            clear_pending_coupon: confirmed_payment,
            current_period_end: fields.period_end,
            gateway_subscription_id: backfill,
        };

        self.store
            .update_subscription(subscription.id, update)
            .await
            .map_err(|e| {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to update subscription from webhook"
                );
                e
            })?;

        let audit = run_non_fatal(
            "audit_event",
            self.event_logger.log_event(
                SubscriptionEventBuilder::new(subscription.user_id, event.unwrap_or("unknown"))
                    .description(describe_gateway_event(
                        event,
                        fields.status.as_deref(),
                        fields.reference_id.as_deref(),
                    ))
                    .plan_name(subscription.plan_name.clone()),
            ),
        )
        .await;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            status = %status,
            confirmed_payment = confirmed_payment,
            "Subscription reconciled from webhook"
        );

        Ok(WebhookOutcome::Applied(ReconcileSummary {
            subscription_id: subscription.id,
            status,
            confirmed_payment,
            coupon,
            audit_logged: audit.is_ok(),
        }))
    }
}

/// Await a sub-task that must not abort reconciliation. A failure is logged
/// here and handed back as a message; it is never propagated.
pub async fn run_non_fatal<T, F>(task: &'static str, fut: F) -> NonFatal<T>
where
    F: Future<Output = BillingResult<T>>,
{
    fut.await.map_err(|e| {
        tracing::error!(
            task = task,
            error = %e,
            "Non-fatal webhook sub-task failed, continuing"
        );
        e.to_string()
    })
}
