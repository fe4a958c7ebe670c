use std::sync::Arc;

use crate::config::AppConfig;
use crate::limiter::{LimiterError, SlidingWindowLimiter};
use crate::service::DetectorService;

/// Shared application state.
///
/// Created once at startup; the limiter windows are the only mutable state
/// and live for the process lifetime, never persisted.
pub struct ServerState {
    pub config: Arc<AppConfig>,
    pub service: Arc<DetectorService>,
    /// Quota window for the embed endpoint.
    pub embed_quota: SlidingWindowLimiter,
    /// The detect endpoint gets its own window, mirroring the embed one.
    pub detect_quota: SlidingWindowLimiter,
}

impl ServerState {
    pub fn new(config: AppConfig, service: Arc<DetectorService>) -> Result<Self, LimiterError> {
        let window = config.quota_window();
        Ok(Self {
            embed_quota: SlidingWindowLimiter::new(config.quota_max_requests, window)?,
            detect_quota: SlidingWindowLimiter::new(config.quota_max_requests, window)?,
            config: Arc::new(config),
            service,
        })
    }
}
