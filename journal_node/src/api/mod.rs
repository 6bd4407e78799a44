pub mod auth;
pub mod errors;
pub mod handlers;
pub mod rate_limiter;
pub mod server;
pub mod validation;

use std::sync::Arc;

pub use errors::{ApiError, ApiResponse, ApiResult};
pub use server::{build_router, serve};

use crate::ai_services::Analyzer;
use crate::config::NodeConfig;
use crate::identity::JwtKeys;
use crate::storage::JournalStore;
use rate_limiter::RateLimiter;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JournalStore>,
    pub keys: Arc<JwtKeys>,
    pub analyzer: Arc<Analyzer>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<NodeConfig>,
}

impl AppState {
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn JournalStore>,
        analyzer: Arc<Analyzer>,
    ) -> Self {
        let keys = JwtKeys::new(&config.jwt_secret, config.token_ttl);
        let limiter = RateLimiter::new(config.rate_limit.clone());

        Self {
            store,
            keys: Arc::new(keys),
            analyzer,
            limiter: Arc::new(limiter),
            config: Arc::new(config),
        }
    }
}
