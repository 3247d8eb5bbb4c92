//! API routes

pub mod health;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        .with_state(state)
}
