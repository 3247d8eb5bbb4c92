//! Coupon accounting for confirmed payments
//!
//! A subscription may carry a `pending_coupon` code that was applied at
//! checkout. When the first confirmed payment arrives the redemption is
//! recorded here. The whole flow is best-effort: failures are reported back
//! as a [`CouponOutcome`] and never abort reconciliation.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::payload::ExtractedFields;
use crate::store::{ReconcileStore, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponType {
    Percentage,
    Fixed,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponType::Percentage => "percentage",
            CouponType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for CouponType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CouponType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Ok(CouponType::Percentage),
            "fixed" => Ok(CouponType::Fixed),
            other => Err(BillingError::DataIntegrity(format!(
                "unknown coupon type '{}'",
                other
            ))),
        }
    }
}

/// A discount rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: CouponType,
    pub discount_value: f64,
    pub usage_count: i64,
}

/// One recorded redemption
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponUsage {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub original_amount: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
}

/// What happened to the pending coupon during reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum CouponOutcome {
    /// Not a confirmed payment, or nothing pending
    NotApplicable,
    Redeemed(CouponUsage),
    CouponNotFound(String),
    /// Lookup, insert or increment failed; the error was logged and dropped
    Failed(String),
}

/// Discount for an amount. Percentage coupons take a share of `original`,
/// fixed coupons are worth their face value.
pub fn compute_discount(coupon: &Coupon, original: f64) -> f64 {
    match coupon.discount_type {
        CouponType::Percentage => original * coupon.discount_value / 100.0,
        CouponType::Fixed => coupon.discount_value,
    }
}

/// Build the usage row from the event amounts.
///
/// The original amount is `originalValue`, else `value`. The final amount is
/// what the gateway charged (`value`), else original minus discount.
pub fn build_usage(
    coupon: &Coupon,
    subscription: &Subscription,
    fields: &ExtractedFields,
) -> CouponUsage {
    let original_amount = fields.original_value.or(fields.value).unwrap_or(0.0);
    let discount_amount = compute_discount(coupon, original_amount);
    let final_amount = fields
        .value
        .unwrap_or_else(|| (original_amount - discount_amount).max(0.0));

    CouponUsage {
        coupon_id: coupon.id,
        user_id: subscription.user_id,
        subscription_id: subscription.id,
        original_amount,
        discount_amount,
        final_amount,
    }
}

/// Record redemption of `code` for `subscription`.
///
/// Returns `Ok(None)` when no coupon carries that code. Errors are for the
/// caller to log; see `WebhookHandler` which runs this as a non-fatal task.
pub async fn redeem_pending_coupon(
    store: &dyn ReconcileStore,
    code: &str,
    subscription: &Subscription,
    fields: &ExtractedFields,
) -> BillingResult<Option<CouponUsage>> {
    let code_upper = code.trim().to_uppercase();

    let Some(coupon) = store.find_coupon(&code_upper).await? else {
        return Ok(None);
    };

    let usage = build_usage(&coupon, subscription, fields);
    store.insert_coupon_usage(&usage).await?;
    store.increment_coupon_usage_counter(coupon.id).await?;

    tracing::info!(
        coupon_id = %coupon.id,
        code = %coupon.code,
        subscription_id = %subscription.id,
        original_amount = usage.original_amount,
        discount_amount = usage.discount_amount,
        final_amount = usage.final_amount,
        "Coupon redemption recorded"
    );

    Ok(Some(usage))
}
