use std::sync::Arc;
use poolride_core::UserDirectory;
use poolride_ride::RideOrchestrator;
use poolride_store::RedisClient;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub rides: Arc<RideOrchestrator>,
    pub directory: Arc<dyn UserDirectory>,
    /// Rate limiting is skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    pub requests_per_minute: i64,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
}
