//! Subscription event audit trail
//!
//! Append-only history of what the gateway told us. Rows are inserted once
//! and never updated or deleted.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::store::ReconcileStore;

/// One audit row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionEvent {
    pub user_id: Uuid,
    /// Lowercased gateway event name, e.g. `payment_overdue`
    pub event_type: String,
    pub description: String,
    pub plan_name: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Builder for [`SubscriptionEvent`]
#[derive(Debug, Clone)]
pub struct SubscriptionEventBuilder {
    user_id: Uuid,
    event_type: String,
    description: String,
    plan_name: Option<String>,
}

impl SubscriptionEventBuilder {
    pub fn new(user_id: Uuid, event_type: impl AsRef<str>) -> Self {
        Self {
            user_id,
            event_type: event_type.as_ref().to_lowercase(),
            description: String::new(),
            plan_name: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn plan_name(mut self, plan_name: Option<String>) -> Self {
        self.plan_name = plan_name;
        self
    }

    pub fn build(self) -> SubscriptionEvent {
        SubscriptionEvent {
            user_id: self.user_id,
            event_type: self.event_type,
            description: self.description,
            plan_name: self.plan_name,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Writes audit rows through the store
#[derive(Clone)]
pub struct SubscriptionEventLogger {
    store: Arc<dyn ReconcileStore>,
}

impl SubscriptionEventLogger {
    pub fn new(store: Arc<dyn ReconcileStore>) -> Self {
        Self { store }
    }

    /// Append one event. Errors are returned, the caller decides whether they matter.
    pub async fn log_event(&self, builder: SubscriptionEventBuilder) -> BillingResult<()> {
        let event = builder.build();
        self.store.insert_audit_event(&event).await?;

        tracing::debug!(
            user_id = %event.user_id,
            event_type = %event.event_type,
            "Subscription event logged"
        );

        Ok(())
    }
}

/// Human-readable summary stored with each event
pub fn describe_gateway_event(
    event: Option<&str>,
    status: Option<&str>,
    reference_id: Option<&str>,
) -> String {
    format!(
        "Gateway event {} (status: {}, ref: {})",
        event.unwrap_or("unknown"),
        status.unwrap_or("none"),
        reference_id.unwrap_or("none")
    )
}
