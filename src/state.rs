mod request_id;

use crate::config::AppConfig;
use crate::emulator::EmulationConfig;
use crate::error::ProxyError;
use crate::transport::UpstreamClient;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Holds no per-session data: every emulated stream owns its own state.
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamClient,
    pub emulation: EmulationConfig,
    request_ids: RequestIdGenerator,
}

impl AppState {
    /// # Errors
    ///
    /// Returns [`ProxyError::ServerMisconfigured`] when the upstream client
    /// cannot be built from the configuration.
    pub fn new(config: AppConfig) -> Result<Self, ProxyError> {
        let upstream = UpstreamClient::new(&config.upstream, &config.server)?;
        let emulation = EmulationConfig::from(&config.streaming);
        Ok(Self {
            config,
            upstream,
            emulation,
            request_ids: RequestIdGenerator::new(),
        })
    }

    /// Allocate a fresh `chatcmpl-…` id for one request.
    pub fn next_completion_id(&self) -> String {
        self.request_ids.next_completion_id()
    }
}
