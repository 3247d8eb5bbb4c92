// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Subdesk API Library
//!
//! HTTP surface for payment gateway webhooks.

pub mod config;
pub mod error;
pub mod request;
pub mod routes;
pub mod state;

pub use config::{Config, LogFormat, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use request::RequestContext;
pub use routes::create_router;
pub use state::AppState;
