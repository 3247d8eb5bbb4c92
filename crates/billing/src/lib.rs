// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

//! Subdesk Billing Module
//!
//! Reconciles payment gateway webhooks into subscription records.
//!
//! ## Features
//!
//! - **Payload Resolution**: Defensive probing of `payment` / `subscription` / flat payloads
//! - **Status Mapping**: Gateway statuses folded onto four internal states
//! - **Coupon Accounting**: Pending coupons redeemed once on confirmed payment
//! - **Audit Trail**: Append-only subscription events
//! - **Stores**: PostgreSQL in production, in-memory for tests

pub mod coupon;
pub mod error;
pub mod events;
pub mod memory_store;
pub mod payload;
pub mod pg_store;
pub mod status;
pub mod store;
pub mod webhooks;


// Coupon
pub use coupon::{compute_discount, Coupon, CouponOutcome, CouponType, CouponUsage};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{SubscriptionEvent, SubscriptionEventBuilder, SubscriptionEventLogger};

// Payload
pub use payload::{ExtractedFields, TargetObject, TargetSource};

// Status
pub use status::{is_confirmed_payment, map_gateway_status, SubscriptionStatus};

// Stores
pub use memory_store::{FailPoint, InMemoryReconcileStore};
pub use pg_store::PgReconcileStore;
pub use store::{ReconcileStore, Subscription, SubscriptionUpdate};

// Webhooks
pub use webhooks::{ReconcileSummary, WebhookHandler, WebhookOutcome};
