//! Application state shared across routes

use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::{AuthState, SessionRegistry};
use crate::config::Config;
use crate::guard::RoutePolicy;
use crewdesk_billing::BillingService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    /// None when billing is disabled or Stripe env vars are absent
    pub billing: Option<Arc<BillingService>>,
    pub route_policy: Arc<RoutePolicy>,
    pub http_client: Client,
    pub sessions: SessionRegistry,
    auth: AuthState,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let http_client = Client::new();

        let billing = if config.enable_billing {
            match BillingService::from_env(pool.clone()) {
                Ok(service) => Some(Arc::new(service)),
                Err(e) => {
                    tracing::warn!(error = %e, "Billing disabled: Stripe configuration missing");
                    None
                }
            }
        } else {
            tracing::info!("Billing disabled by configuration");
            None
        };

        let auth = AuthState::new(pool.clone(), &config, http_client.clone());
        let sessions = SessionRegistry::new(pool.clone());

        Self {
            pool,
            config: Arc::new(config),
            billing,
            route_policy: Arc::new(RoutePolicy::default()),
            http_client,
            sessions,
            auth,
        }
    }

    /// Auth state for middleware layers
    pub fn auth_state(&self) -> AuthState {
        self.auth.clone()
    }
}
