use crate::config::AppConfig;
use crate::transport::BackendClient;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: BackendClient,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: BackendClient) -> Self {
        Self { config, transport }
    }

    /// Configured fallback model name, if any.
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.config.backend.default_model_name.as_deref()
    }
}
