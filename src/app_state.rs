//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::driver::DeviceDriver;
use crate::service::GatewayService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway service: interpreter, sessions, dispatch.
    pub gateway: Arc<GatewayService>,
}

impl AppState {
    /// Builds the state, including the broadcaster task, for `driver`.
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: &GatewayConfig, driver: Box<dyn DeviceDriver>) -> Self {
        Self {
            gateway: Arc::new(GatewayService::from_config(config, driver)),
        }
    }
}
