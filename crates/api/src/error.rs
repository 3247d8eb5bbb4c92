//! API error responses

use axum::{
    extract::rejection::BytesRejection,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subdesk_billing::BillingError;

use crate::request::RequestContext;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error converted to `{error, requestId, version}` at the route boundary
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub context: RequestContext,
}

impl ApiError {
    pub fn unauthorized(context: RequestContext) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "unauthorized".to_string(),
            context,
        }
    }

    /// Body could not be buffered, e.g. 413 when it exceeds the size limit
    pub fn body_rejected(rejection: BytesRejection, context: RequestContext) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
            context,
        }
    }

    /// Fatal reconciliation failures are reported as 400, see DESIGN.md for
    /// the gateway retry trade-off.
    pub fn from_billing(err: BillingError, context: RequestContext) -> Self {
        match err {
            BillingError::Unauthorized => Self::unauthorized(context),
            other => Self {
                status: StatusCode::BAD_REQUEST,
                message: other.to_string(),
                context,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "requestId": self.context.request_id,
            "version": self.context.version,
        }));

        let mut response = (self.status, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.context.request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}
