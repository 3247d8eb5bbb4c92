//! Billing errors

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(String),

    /// The store returned something that should be impossible, e.g. two
    /// subscriptions claiming the same gateway identifiers.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Webhook access token missing or invalid")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::InvalidPayload(err.to_string())
    }
}
