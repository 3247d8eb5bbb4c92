//! Health check

use axum::Json;
use serde_json::{json, Value};

use crate::request::WEBHOOK_VERSION;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": WEBHOOK_VERSION,
    }))
}
