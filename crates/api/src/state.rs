//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use pixelhost_billing::BillingService;
use pixelhost_panel::PanelClient;

use crate::auth::JwtManager;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
    pub panel: PanelClient,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: Config,
        billing: BillingService,
        panel: PanelClient,
    ) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret);
        Self {
            pool,
            config,
            jwt_manager,
            billing: Arc::new(billing),
            panel,
        }
    }
}
