//! Payment gateway webhook route

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use subdesk_billing::{BillingError, WebhookOutcome};
use tracing::Instrument;

use crate::{
    error::{ApiError, ApiResult},
    request::RequestContext,
    state::AppState,
};

/// POST /webhooks/payments
///
/// Always answers 200 for events that were applied or deliberately ignored,
/// so the gateway stops redelivering them. 401 for a bad access token, 400
/// for anything that failed while processing. A body over the default
/// 2 MB limit is answered with 413 in the same JSON error shape.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let context = RequestContext::generate();
    let span = context.span();

    async move {
        match process_webhook(&state, &headers, body, &context).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
    context: &RequestContext,
) -> ApiResult<Response> {
    let token = headers
        .get(state.config.webhook_token_header.as_str())
        .and_then(|value| value.to_str().ok());

    state
        .webhooks
        .authorize(token)
        .map_err(|e| ApiError::from_billing(e, context.clone()))?;

    let body = body.map_err(|rejection| {
        tracing::error!(error = %rejection, "Webhook body could not be read");
        ApiError::body_rejected(rejection, context.clone())
    })?;

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(error = %e, body_len = body.len(), "Webhook body is not valid JSON");
        ApiError::from_billing(BillingError::from(e), context.clone())
    })?;

    let outcome = state.webhooks.reconcile(&payload).await.map_err(|e| {
        tracing::error!(error = %e, "Webhook processing failed");
        ApiError::from_billing(e, context.clone())
    })?;

    Ok(outcome_response(&outcome, context))
}

/// JSON body for a reconciler outcome
pub fn outcome_response(outcome: &WebhookOutcome, context: &RequestContext) -> Response {
    let body = match outcome {
        WebhookOutcome::Applied(_) => json!({
            "success": true,
            "requestId": context.request_id,
            "version": context.version,
        }),
        WebhookOutcome::NoTargetObject => json!({
            "received": true,
            "note": "no target object",
            "requestId": context.request_id,
            "version": context.version,
        }),
        WebhookOutcome::NoIdentifiers => json!({
            "received": true,
            "note": "no identifiers found",
            "requestId": context.request_id,
            "version": context.version,
        }),
        WebhookOutcome::SubscriptionNotFound { .. } => json!({
            "received": true,
            "warning": "subscription not found",
            "requestId": context.request_id,
            "version": context.version,
        }),
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&context.request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
