//! Gateway status mapping
//!
//! The gateway reports its own status vocabulary (`OVERDUE`, `REFUNDED`, ...).
//! Internally a subscription only ever holds one of four states, so every raw
//! status is folded through [`STATUS_RULES`]. Event names are classified
//! separately by [`is_confirmed_payment`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::BillingError;

/// Internal subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            other => Err(BillingError::DataIntegrity(format!(
                "unknown subscription status '{}'",
                other
            ))),
        }
    }
}

/// A single mapping rule: when `matches` accepts the (upper-cased) gateway
/// status, the subscription takes `status`.
pub struct StatusRule {
    pub matches: fn(&str) -> bool,
    pub status: SubscriptionStatus,
}

/// Ordered rules. All rules are evaluated; the last one that matches wins.
pub const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        matches: |s| s == "OVERDUE",
        status: SubscriptionStatus::PastDue,
    },
    StatusRule {
        matches: |s| s == "DELETED" || s == "REFUNDED",
        status: SubscriptionStatus::Canceled,
    },
    StatusRule {
        matches: |s| s == "PENDING",
        status: SubscriptionStatus::Incomplete,
    },
];

/// Map a raw gateway status onto the internal status. Total: anything the
/// rules don't recognise, including no status at all, is `Active`.
pub fn map_gateway_status(raw: Option<&str>) -> SubscriptionStatus {
    map_with_rules(STATUS_RULES, raw)
}

/// Evaluate `rules` in order against `raw`; the last match wins.
pub fn map_with_rules(rules: &[StatusRule], raw: Option<&str>) -> SubscriptionStatus {
    let Some(raw) = raw else {
        return SubscriptionStatus::Active;
    };
    let normalized = raw.trim().to_ascii_uppercase();

    rules
        .iter()
        .filter(|rule| (rule.matches)(&normalized))
        .last()
        .map(|rule| rule.status)
        .unwrap_or(SubscriptionStatus::Active)
}

/// Gateway event names that mean money actually arrived.
pub const CONFIRMED_PAYMENT_EVENTS: &[&str] = &["PAYMENT_CONFIRMED", "PAYMENT_RECEIVED"];

/// Whether the event name is one of the confirmed-payment equivalents.
pub fn is_confirmed_payment(event: Option<&str>) -> bool {
    event.is_some_and(|name| {
        let name = name.trim();
        CONFIRMED_PAYMENT_EVENTS
            .iter()
            .any(|confirmed| confirmed.eq_ignore_ascii_case(name))
    })
}
