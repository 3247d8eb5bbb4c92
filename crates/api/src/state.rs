//! Application state

use std::sync::Arc;

use subdesk_billing::{InMemoryReconcileStore, PgReconcileStore, ReconcileStore, WebhookHandler};
use subdesk_shared::create_pool;

use crate::config::{Config, StoreBackend};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub webhooks: WebhookHandler,
}

impl AppState {
    /// Build state around an already constructed store
    pub fn new(config: Config, store: Arc<dyn ReconcileStore>) -> Self {
        let webhooks = WebhookHandler::new(store, config.webhook_access_token.clone());

        if webhooks.is_open_mode() {
            tracing::warn!("WEBHOOK_ACCESS_TOKEN not set - webhook endpoint accepts unauthenticated requests");
        } else {
            tracing::info!(
                header = %config.webhook_token_header,
                "Webhook access token check enabled"
            );
        }

        Self {
            config: Arc::new(config),
            webhooks,
        }
    }

    /// Connect the configured store backend and build state
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn ReconcileStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for the postgres store"))?;
                tracing::info!("Connecting to database...");
                let pool = create_pool(database_url, config.database_max_connections).await?;
                tracing::info!("Database connection established");
                Arc::new(PgReconcileStore::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store - nothing will be persisted");
                Arc::new(InMemoryReconcileStore::new())
            }
        };

        Ok(Self::new(config, store))
    }
}
