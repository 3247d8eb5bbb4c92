//! Webhook payload resolution
//!
//! Gateway notifications arrive in several shapes: a `payment` object, a
//! `subscription` object, or the object itself at the top level. Nothing is
//! enforced by a schema, so fields are read defensively.
//!
//! ## Resolution policy
//!
//! 1. `payment`, if it is a JSON object
//! 2. `subscription`, if it is a JSON object
//! 3. the body itself, if it is an object carrying a non-null `id`
//!
//! Fields missing on the target fall back to the same field on the body.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Where the target object was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    Payment,
    Subscription,
    Body,
}

/// The single object an event is about
#[derive(Debug, Clone)]
pub struct TargetObject<'a> {
    pub source: TargetSource,
    pub object: &'a Map<String, Value>,
}

/// Which field produced the gateway subscription id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionIdSource {
    /// Explicit `subscriptionId`
    SubscriptionIdField,
    /// A string `subscription` field, as carried on payment objects
    SubscriptionField,
    /// The target object's own `id`
    ObjectId,
}

/// Everything the reconciler reads out of a payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub event: Option<String>,
    pub customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub subscription_id_source: Option<SubscriptionIdSource>,
    pub status: Option<String>,
    pub period_end: Option<OffsetDateTime>,
    pub value: Option<f64>,
    pub original_value: Option<f64>,
    /// The target object's own id, used as a reference in the audit trail
    pub reference_id: Option<String>,
}

impl ExtractedFields {
    pub fn has_identifiers(&self) -> bool {
        self.customer_id.is_some() || self.gateway_subscription_id.is_some()
    }

    /// Whether the subscription id may be written back onto a subscription
    /// row. A payment's own id is not a subscription id.
    pub fn supplies_subscription_link(&self, target: TargetSource) -> bool {
        match self.subscription_id_source {
            Some(SubscriptionIdSource::SubscriptionIdField)
            | Some(SubscriptionIdSource::SubscriptionField) => true,
            Some(SubscriptionIdSource::ObjectId) => target == TargetSource::Subscription,
            None => false,
        }
    }
}

/// Pick the target object, trying `payment`, then `subscription`, then the body.
pub fn resolve_target(body: &Value) -> Option<TargetObject<'_>> {
    let root = body.as_object()?;

    if let Some(object) = root.get("payment").and_then(Value::as_object) {
        return Some(TargetObject {
            source: TargetSource::Payment,
            object,
        });
    }

    if let Some(object) = root.get("subscription").and_then(Value::as_object) {
        return Some(TargetObject {
            source: TargetSource::Subscription,
            object,
        });
    }

    match root.get("id") {
        Some(id) if !id.is_null() => Some(TargetObject {
            source: TargetSource::Body,
            object: root,
        }),
        _ => None,
    }
}

/// Read identifiers and amounts from the target, falling back to the body.
pub fn extract_fields(body: &Value, target: &TargetObject<'_>) -> ExtractedFields {
    let root = body.as_object();
    let lookup = |key: &str| {
        string_field(target.object, key).or_else(|| root.and_then(|r| string_field(r, key)))
    };

    let (gateway_subscription_id, subscription_id_source) =
        if let Some(id) = string_field(target.object, "subscriptionId") {
            (Some(id), Some(SubscriptionIdSource::SubscriptionIdField))
        } else if let Some(id) = string_field(target.object, "subscription") {
            (Some(id), Some(SubscriptionIdSource::SubscriptionField))
        } else if let Some(id) = string_field(target.object, "id") {
            (Some(id), Some(SubscriptionIdSource::ObjectId))
        } else {
            (None, None)
        };

    // The target's own dates outrank anything at the top level.
    let due_date = |object: &Map<String, Value>| {
        string_field(object, "nextDueDate").or_else(|| string_field(object, "dueDate"))
    };
    let period_end = due_date(target.object)
        .or_else(|| root.and_then(due_date))
        .and_then(|raw| {
            let parsed = parse_due_date(&raw);
            if parsed.is_none() {
                tracing::warn!(due_date = %raw, "Ignoring unparseable due date");
            }
            parsed
        });

    ExtractedFields {
        event: root.and_then(|r| string_field(r, "event")),
        customer_id: lookup("customer"),
        gateway_subscription_id,
        subscription_id_source,
        status: lookup("status"),
        period_end,
        value: number_field(target.object, "value"),
        original_value: number_field(target.object, "originalValue"),
        reference_id: string_field(target.object, "id"),
    }
}

/// Accepts `YYYY-MM-DD` (taken as midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_due_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight().assume_utc());
    }
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}

/// Non-empty string, or a number rendered as one (some gateways send numeric ids)
fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    match object.get(key)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_payment_wins_over_subscription() {
        let body = json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": { "id": "pay_1" },
            "subscription": { "id": "sub_1" },
        });
        let target = resolve_target(&body).unwrap();
        assert_eq!(target.source, TargetSource::Payment);
    }

    #[test]
    fn test_subscription_used_when_payment_not_an_object() {
        let body = json!({
            "payment": "pay_1",
            "subscription": { "id": "sub_1" },
        });
        let target = resolve_target(&body).unwrap();
        assert_eq!(target.source, TargetSource::Subscription);
    }

    #[test]
    fn test_flat_body_needs_an_id() {
        let flat = json!({ "id": "sub_9", "customer": "cus_9" });
        assert_eq!(resolve_target(&flat).unwrap().source, TargetSource::Body);

        assert!(resolve_target(&json!({})).is_none());
        assert!(resolve_target(&json!({ "id": null })).is_none());
        assert!(resolve_target(&json!({ "event": "PAYMENT_CREATED" })).is_none());
        assert!(resolve_target(&json!([1, 2, 3])).is_none());
        assert!(resolve_target(&json!("payment")).is_none());
    }

    #[test]
    fn test_extracts_payment_fields() {
        let body = json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {
                "id": "pay_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "status": "CONFIRMED",
                "dueDate": "2026-11-05",
                "value": 900,
                "originalValue": "1000.00",
            },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);

        assert_eq!(fields.event.as_deref(), Some("PAYMENT_CONFIRMED"));
        assert_eq!(fields.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(fields.gateway_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(
            fields.subscription_id_source,
            Some(SubscriptionIdSource::SubscriptionField)
        );
        assert_eq!(fields.status.as_deref(), Some("CONFIRMED"));
        assert_eq!(fields.period_end, Some(datetime!(2026-11-05 0:00 UTC)));
        assert_eq!(fields.value, Some(900.0));
        assert_eq!(fields.original_value, Some(1000.0));
        assert_eq!(fields.reference_id.as_deref(), Some("pay_1"));
    }

    #[test]
    fn test_subscription_id_field_preferred_over_own_id() {
        let body = json!({
            "subscription": { "id": "obj_1", "subscriptionId": "sub_explicit" },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.gateway_subscription_id.as_deref(), Some("sub_explicit"));
        assert_eq!(
            fields.subscription_id_source,
            Some(SubscriptionIdSource::SubscriptionIdField)
        );
    }

    #[test]
    fn test_falls_back_to_object_id_and_body_fields() {
        let body = json!({
            "customer": "cus_top",
            "status": "OVERDUE",
            "subscription": { "id": "sub_own" },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.customer_id.as_deref(), Some("cus_top"));
        assert_eq!(fields.status.as_deref(), Some("OVERDUE"));
        assert_eq!(fields.gateway_subscription_id.as_deref(), Some("sub_own"));
        assert!(fields.supplies_subscription_link(target.source));
    }

    #[test]
    fn test_payment_own_id_is_not_a_subscription_link() {
        let body = json!({ "payment": { "id": "pay_7", "customer": "cus_7" } });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.gateway_subscription_id.as_deref(), Some("pay_7"));
        assert!(!fields.supplies_subscription_link(target.source));
    }

    #[test]
    fn test_next_due_date_preferred_over_due_date() {
        let body = json!({
            "subscription": {
                "id": "sub_1",
                "nextDueDate": "2026-12-01",
                "dueDate": "2026-11-01",
            },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.period_end, Some(datetime!(2026-12-01 0:00 UTC)));
    }

    #[test]
    fn test_target_due_date_outranks_top_level_next_due_date() {
        let body = json!({
            "nextDueDate": "2027-01-01",
            "subscription": { "id": "sub_1", "dueDate": "2026-11-01" },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.period_end, Some(datetime!(2026-11-01 0:00 UTC)));

        let body = json!({
            "dueDate": "2027-01-01",
            "subscription": { "id": "sub_1" },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.period_end, Some(datetime!(2027-01-01 0:00 UTC)));
    }

    #[test]
    fn test_non_finite_amounts_are_absent() {
        let body = json!({
            "payment": {
                "id": "pay_1",
                "customer": "cus_1",
                "value": "NaN",
                "originalValue": "inf",
            },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.value, None);
        assert_eq!(fields.original_value, None);

        let body = json!({
            "payment": { "id": "pay_1", "value": "-infinity", "originalValue": " 49.90 " },
        });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert_eq!(fields.value, None);
        assert_eq!(fields.original_value, Some(49.90));
    }

    #[test]
    fn test_bad_due_date_treated_as_absent() {
        let body = json!({ "subscription": { "id": "sub_1", "nextDueDate": "next tuesday" } });
        let target = resolve_target(&body).unwrap();
        assert_eq!(extract_fields(&body, &target).period_end, None);
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let body = json!({ "payment": { "id": "", "customer": "  " } });
        let target = resolve_target(&body).unwrap();
        let fields = extract_fields(&body, &target);
        assert!(!fields.has_identifiers());
    }

    #[test]
    fn test_rfc3339_due_date() {
        assert_eq!(
            parse_due_date("2026-11-05T12:30:00Z"),
            Some(datetime!(2026-11-05 12:30 UTC))
        );
    }
}
