//! Gateway shared state.

use std::sync::Arc;

use repolens_agent::AgentEventSource;
use repolens_core::config::Config;
use repolens_store::StorageBackend;

/// Shared state accessible from all handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub source: Arc<dyn AgentEventSource>,
    pub backend: Arc<dyn StorageBackend>,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn AgentEventSource>,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            config,
            source,
            backend,
        }
    }
}
