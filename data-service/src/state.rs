//! Application state for the data service.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;

use crate::package_registry::{PackageRegistry, PubDevRegistry};
use crate::service::GatewayService;

/// Application state shared across handlers.
///
/// Holds no connections: every request opens its own session.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub service: Arc<GatewayService>,
}

impl AppState {
    /// Creates state backed by the configured pub.dev endpoint.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let registry = Arc::new(PubDevRegistry::new(&config)?);
        Ok(Self::with_registry(config, registry))
    }

    /// Creates state with an explicit package registry.
    pub fn with_registry(config: AppConfig, registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            service: Arc::new(GatewayService::new(config.clone(), registry)),
            config,
        }
    }
}
